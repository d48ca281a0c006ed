//! Chunked relay from a snapshot producer to a consumer.
//!
//! The producer and consumer run concurrently inside the store (two `zfs`
//! processes for [`zbackup_store::ZfsStore`]). The pipeline moves one chunk at
//! a time between them: a chunk is fully handed to the consumer before the
//! next one is read, so memory stays bounded to a single buffer and the
//! producer can never outrun the consumer.

use crate::error::TransferError;
use crate::reconcile::TransferMode;
use crate::report::Reporter;
use crate::snapshot::Snapshot;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tracing::debug;
use zbackup_store::{SendRequest, SnapshotStore};

/// Default relay buffer size (16 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// One snapshot to move between volumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Volume the snapshot is read from.
    pub source_volume: String,
    /// Volume the stream is applied to.
    pub target_volume: String,
    /// Snapshot being transferred.
    pub snapshot: Snapshot,
    /// Full or delta.
    pub mode: TransferMode,
}

impl TransferRequest {
    /// A complete-state transfer of `snapshot`.
    pub fn full(
        source_volume: impl Into<String>,
        target_volume: impl Into<String>,
        snapshot: Snapshot,
    ) -> Self {
        Self {
            source_volume: source_volume.into(),
            target_volume: target_volume.into(),
            snapshot,
            mode: TransferMode::Full,
        }
    }

    /// An incremental transfer from `from` to `snapshot`.
    pub fn delta(
        source_volume: impl Into<String>,
        target_volume: impl Into<String>,
        from: Snapshot,
        snapshot: Snapshot,
    ) -> Self {
        Self {
            source_volume: source_volume.into(),
            target_volume: target_volume.into(),
            snapshot,
            mode: TransferMode::Delta { from },
        }
    }

    /// The producer request for this transfer.
    pub fn send_request(&self) -> SendRequest {
        match &self.mode {
            TransferMode::Full => SendRequest::full(&self.source_volume, self.snapshot.name()),
            TransferMode::Delta { from } => SendRequest::incremental(
                &self.source_volume,
                from.name(),
                self.snapshot.name(),
            ),
        }
    }
}

/// Accounting for a completed transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Bytes relayed.
    pub bytes: u64,
    /// Non-empty chunks relayed.
    pub chunks: u64,
    /// Wall time from producer start to consumer completion.
    pub duration: Duration,
}

/// Relays a producer stream into a consumer in fixed-size chunks.
#[derive(Debug, Clone)]
pub struct TransferPipeline {
    chunk_size: usize,
}

impl Default for TransferPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl TransferPipeline {
    /// Creates a pipeline with the given buffer size. A zero size is raised
    /// to one byte.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Buffer size in bytes.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Runs one transfer to completion.
    ///
    /// Success means every chunk was accepted in full and the consumer
    /// confirmed the apply. An empty stream is a successful zero-byte
    /// transfer. Any failure abandons the attempt; dropping the producer and
    /// consumer handles tears both down.
    ///
    /// # Errors
    ///
    /// Returns a [`TransferError`] naming the side that failed.
    pub fn run<S: SnapshotStore + ?Sized>(
        &self,
        store: &S,
        request: &TransferRequest,
        reporter: &dyn Reporter,
    ) -> Result<TransferStats, TransferError> {
        let start = Instant::now();
        let send = request.send_request();
        debug!(
            source = %send,
            target = %request.target_volume,
            chunk_size = self.chunk_size,
            "starting transfer"
        );

        let mut producer = store.send(&send).map_err(TransferError::ProducerStart)?;
        let mut consumer = store
            .receive(&request.target_volume)
            .map_err(TransferError::ConsumerStart)?;

        let mut buffer = vec![0u8; self.chunk_size];
        let mut stats = TransferStats::default();

        loop {
            let read = match producer.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransferError::Read(e)),
            };

            let written = write_chunk(consumer.as_mut(), &buffer[..read])?;
            if written != read {
                return Err(TransferError::ShortWrite { read, written });
            }

            stats.bytes += written as u64;
            stats.chunks += 1;
            reporter.transfer_progress(stats.bytes);
        }

        consumer.finish().map_err(TransferError::Consumer)?;
        stats.duration = start.elapsed();
        debug!(bytes = stats.bytes, chunks = stats.chunks, "transfer applied");
        Ok(stats)
    }
}

/// Hands one chunk to the consumer with a single write call.
fn write_chunk<W: Write + ?Sized>(consumer: &mut W, chunk: &[u8]) -> Result<usize, TransferError> {
    loop {
        match consumer.write(chunk) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            result => return result.map_err(TransferError::Write),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::NoopReporter;
    use parking_lot::Mutex;
    use zbackup_store::{Fault, InMemoryStore, StoreCall};

    #[derive(Default)]
    struct ProgressLog(Mutex<Vec<u64>>);

    impl Reporter for ProgressLog {
        fn transfer_progress(&self, bytes: u64) {
            self.0.lock().push(bytes);
        }
    }

    fn seeded() -> InMemoryStore {
        let store = InMemoryStore::with_volumes(["tank", "backup"]);
        store.seed_with_payload("tank", "s1", 100, vec![7u8; 100]);
        store.seed_with_payload("tank", "s2", 200, vec![9u8; 50]);
        store
    }

    #[test]
    fn send_request_follows_mode() {
        let full = TransferRequest::full("tank", "backup", Snapshot::new("s1", 100));
        assert_eq!(full.send_request(), SendRequest::full("tank", "s1"));

        let delta = TransferRequest::delta(
            "tank",
            "backup",
            Snapshot::new("s1", 100),
            Snapshot::new("s2", 200),
        );
        assert_eq!(
            delta.send_request(),
            SendRequest::incremental("tank", "s1", "s2")
        );
    }

    #[test]
    fn relays_in_chunks_and_reports_running_total() {
        let store = seeded();
        let pipeline = TransferPipeline::new(16);
        let progress = ProgressLog::default();
        let request = TransferRequest::full("tank", "backup", Snapshot::new("s1", 100));

        let stats = pipeline.run(&store, &request, &progress).unwrap();

        assert!(stats.bytes > 100);
        assert_eq!(stats.chunks, stats.bytes.div_ceil(16));
        let totals = progress.0.lock().clone();
        assert_eq!(totals.len() as u64, stats.chunks);
        assert!(totals.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(totals.last().copied(), Some(stats.bytes));
        assert_eq!(store.snapshot_names("backup"), vec!["s1"]);
    }

    #[test]
    fn delta_applies_on_top_of_base() {
        let store = seeded();
        let pipeline = TransferPipeline::default();
        pipeline
            .run(
                &store,
                &TransferRequest::full("tank", "backup", Snapshot::new("s1", 100)),
                &NoopReporter,
            )
            .unwrap();

        let request = TransferRequest::delta(
            "tank",
            "backup",
            Snapshot::new("s1", 100),
            Snapshot::new("s2", 200),
        );
        pipeline.run(&store, &request, &NoopReporter).unwrap();

        assert_eq!(store.snapshot_names("backup"), vec!["s1", "s2"]);
        assert!(store.calls().contains(&StoreCall::Send(SendRequest::incremental(
            "tank", "s1", "s2"
        ))));
    }

    #[test]
    fn short_write_aborts_without_applying() {
        let store = seeded();
        store.inject(Fault::ShortWrite);
        let request = TransferRequest::full("tank", "backup", Snapshot::new("s1", 100));

        let err = TransferPipeline::new(32)
            .run(&store, &request, &NoopReporter)
            .unwrap_err();

        assert!(matches!(
            err,
            TransferError::ShortWrite { read: 32, written: 31 }
        ));
        assert!(store.snapshot_names("backup").is_empty());
    }

    #[test]
    fn read_error_aborts_without_applying() {
        let store = seeded();
        store.inject(Fault::ReadError);
        let request = TransferRequest::full("tank", "backup", Snapshot::new("s1", 100));

        let err = TransferPipeline::new(8)
            .run(&store, &request, &NoopReporter)
            .unwrap_err();

        assert!(matches!(err, TransferError::Read(_)));
        assert!(store.snapshot_names("backup").is_empty());
    }

    #[test]
    fn write_error_aborts_without_applying() {
        let store = seeded();
        store.inject(Fault::WriteError);
        let progress = ProgressLog::default();
        let request = TransferRequest::full("tank", "backup", Snapshot::new("s1", 100));

        let err = TransferPipeline::new(8)
            .run(&store, &request, &progress)
            .unwrap_err();

        assert!(matches!(err, TransferError::Write(_)));
        assert!(progress.0.lock().is_empty());
        assert!(store.snapshot_names("backup").is_empty());
    }

    #[test]
    fn consumer_rejection_is_reported() {
        let store = seeded();
        store.inject(Fault::ReceiveRejected);
        let request = TransferRequest::full("tank", "backup", Snapshot::new("s1", 100));

        let err = TransferPipeline::default()
            .run(&store, &request, &NoopReporter)
            .unwrap_err();

        assert!(matches!(err, TransferError::Consumer(_)));
        assert!(store.snapshot_names("backup").is_empty());
    }

    #[test]
    fn missing_source_snapshot_fails_to_start() {
        let store = seeded();
        let request = TransferRequest::full("tank", "backup", Snapshot::new("nope", 1));

        let err = TransferPipeline::default()
            .run(&store, &request, &NoopReporter)
            .unwrap_err();

        assert!(matches!(err, TransferError::ProducerStart(_)));
    }

    #[test]
    fn empty_stream_is_a_successful_zero_byte_transfer() {
        let store = seeded();
        store.inject(Fault::EmptyStream);
        let progress = ProgressLog::default();
        let request = TransferRequest::full("tank", "backup", Snapshot::new("s1", 100));

        let stats = TransferPipeline::default()
            .run(&store, &request, &progress)
            .unwrap();

        assert_eq!(stats.bytes, 0);
        assert_eq!(stats.chunks, 0);
        assert!(progress.0.lock().is_empty());
    }

    #[test]
    fn zero_chunk_size_is_raised() {
        assert_eq!(TransferPipeline::new(0).chunk_size(), 1);
    }
}
