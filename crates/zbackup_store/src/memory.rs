//! In-memory snapshot store for testing.

use crate::error::{StoreError, StoreResult};
use crate::store::{
    DestroyTarget, ListingEntry, SendRequest, SnapshotSink, SnapshotStore, SnapshotStream,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Creation time handed to the first snapshot made through [`SnapshotStore::create`].
const DEFAULT_CLOCK: i64 = 1_700_000_000;

/// A snapshot held by the in-memory store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    /// Snapshot name without the volume prefix.
    pub name: String,
    /// Creation time in epoch seconds.
    pub created: i64,
    /// Simulated snapshot content.
    pub payload: Vec<u8>,
}

impl StoredSnapshot {
    fn matches(&self, name: &str, created: i64) -> bool {
        self.name == name && self.created == created
    }
}

/// A failure the in-memory store can be told to simulate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Listing the named volume fails.
    ListingUnavailable(String),
    /// Listing the named volume returns non-numeric creation times.
    MalformedListing(String),
    /// Producers fail after their first successful read.
    ReadError,
    /// Producers emit no bytes at all.
    EmptyStream,
    /// Consumers accept one byte less than they were given.
    ShortWrite,
    /// Consumers fail every write.
    WriteError,
    /// Consumers exit unsuccessfully when finished.
    ReceiveRejected,
    /// Snapshot creation fails.
    CreateRejected,
}

/// A call made against the in-memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    /// `list(volume)`.
    List(String),
    /// `create`, as `volume@name`.
    Create(String),
    /// `destroy`, as the rendered target.
    Destroy(String),
    /// `send`.
    Send(SendRequest),
    /// `receive(target)`.
    Receive(String),
    /// `rollback`, as `volume@name`.
    Rollback(String),
}

/// Stream format understood by [`InMemoryStore`] consumers.
#[derive(Debug, Serialize, Deserialize)]
struct StreamPackage {
    base: Option<StreamBase>,
    snapshots: Vec<StoredSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StreamBase {
    name: String,
    created: i64,
}

#[derive(Debug)]
struct Inner {
    volumes: RwLock<BTreeMap<String, Vec<StoredSnapshot>>>,
    clock: AtomicI64,
    faults: RwLock<Vec<Fault>>,
    calls: RwLock<Vec<StoreCall>>,
}

/// An in-memory snapshot store.
///
/// This store keeps every volume's history in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Dry runs of the replication logic
///
/// Clones share the same state, so a test can keep a handle while the
/// engine owns another.
///
/// # Example
///
/// ```rust
/// use zbackup_store::{InMemoryStore, SnapshotStore};
///
/// let store = InMemoryStore::with_volumes(["tank"]);
/// store.create("tank", "daily").unwrap();
/// let listing = store.list("tank").unwrap();
/// assert_eq!(listing[0].identifier, "tank@daily");
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                volumes: RwLock::new(BTreeMap::new()),
                clock: AtomicI64::new(DEFAULT_CLOCK),
                faults: RwLock::new(Vec::new()),
                calls: RwLock::new(Vec::new()),
            }),
        }
    }
}

impl InMemoryStore {
    /// Creates an empty store with no volumes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with the given empty volumes.
    #[must_use]
    pub fn with_volumes<I, V>(volumes: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let store = Self::new();
        for volume in volumes {
            store.add_volume(volume);
        }
        store
    }

    /// Adds an empty volume. Existing volumes are left untouched.
    pub fn add_volume(&self, volume: impl Into<String>) {
        self.inner.volumes.write().entry(volume.into()).or_default();
    }

    /// Appends a snapshot to a volume's history, creating the volume if needed.
    pub fn seed(&self, volume: &str, name: &str, created: i64) {
        self.seed_with_payload(volume, name, created, default_payload(name, created));
    }

    /// Appends a snapshot with explicit content.
    pub fn seed_with_payload(&self, volume: &str, name: &str, created: i64, payload: Vec<u8>) {
        self.inner
            .volumes
            .write()
            .entry(volume.to_string())
            .or_default()
            .push(StoredSnapshot {
                name: name.to_string(),
                created,
                payload,
            });
    }

    /// Returns a copy of a volume's history. Unknown volumes yield an empty list.
    #[must_use]
    pub fn snapshots(&self, volume: &str) -> Vec<StoredSnapshot> {
        self.inner
            .volumes
            .read()
            .get(volume)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the snapshot names of a volume in history order.
    #[must_use]
    pub fn snapshot_names(&self, volume: &str) -> Vec<String> {
        self.snapshots(volume).into_iter().map(|s| s.name).collect()
    }

    /// Sets the creation time the next created snapshot receives.
    pub fn set_clock(&self, epoch_secs: i64) {
        self.inner.clock.store(epoch_secs, Ordering::SeqCst);
    }

    /// Starts simulating a failure. Faults stay active until cleared.
    pub fn inject(&self, fault: Fault) {
        self.inner.faults.write().push(fault);
    }

    /// Stops simulating all failures.
    pub fn clear_faults(&self) {
        self.inner.faults.write().clear();
    }

    /// Returns every call made so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.inner.calls.read().clone()
    }

    /// Returns how many producers were started.
    #[must_use]
    pub fn send_count(&self) -> usize {
        self.count_calls(|call| matches!(call, StoreCall::Send(_)))
    }

    /// Returns how many destroy calls were made.
    #[must_use]
    pub fn destroy_count(&self) -> usize {
        self.count_calls(|call| matches!(call, StoreCall::Destroy(_)))
    }

    fn count_calls(&self, predicate: impl Fn(&StoreCall) -> bool) -> usize {
        self.inner.calls.read().iter().filter(|c| predicate(c)).count()
    }

    fn has_fault(&self, fault: &Fault) -> bool {
        self.inner.faults.read().contains(fault)
    }

    fn record(&self, call: StoreCall) {
        self.inner.calls.write().push(call);
    }
}

fn default_payload(name: &str, created: i64) -> Vec<u8> {
    format!("snapshot {name} taken at {created}").into_bytes()
}

impl SnapshotStore for InMemoryStore {
    fn list(&self, volume: &str) -> StoreResult<Vec<ListingEntry>> {
        self.record(StoreCall::List(volume.to_string()));

        if self.has_fault(&Fault::ListingUnavailable(volume.to_string())) {
            return Err(StoreError::CommandFailed {
                command: format!("list {volume}"),
                stderr: "listing unavailable".into(),
            });
        }
        let malformed = self.has_fault(&Fault::MalformedListing(volume.to_string()));

        let volumes = self.inner.volumes.read();
        let snapshots = volumes
            .get(volume)
            .ok_or_else(|| StoreError::UnknownVolume(volume.to_string()))?;

        Ok(snapshots
            .iter()
            .map(|s| {
                let creation = if malformed {
                    "-".to_string()
                } else {
                    s.created.to_string()
                };
                ListingEntry::new(format!("{volume}@{}", s.name), creation)
            })
            .collect())
    }

    fn create(&self, volume: &str, name: &str) -> StoreResult<()> {
        self.record(StoreCall::Create(format!("{volume}@{name}")));

        if self.has_fault(&Fault::CreateRejected) {
            return Err(StoreError::CommandFailed {
                command: format!("snapshot {volume}@{name}"),
                stderr: "out of space".into(),
            });
        }

        let mut volumes = self.inner.volumes.write();
        let snapshots = volumes
            .get_mut(volume)
            .ok_or_else(|| StoreError::UnknownVolume(volume.to_string()))?;

        if snapshots.iter().any(|s| s.name == name) {
            return Err(StoreError::AlreadyExists(format!("{volume}@{name}")));
        }

        let created = self.inner.clock.fetch_add(1, Ordering::SeqCst);
        snapshots.push(StoredSnapshot {
            name: name.to_string(),
            created,
            payload: default_payload(name, created),
        });
        Ok(())
    }

    fn destroy(&self, target: &DestroyTarget) -> StoreResult<()> {
        self.record(StoreCall::Destroy(target.to_string()));

        let mut volumes = self.inner.volumes.write();
        let snapshots = volumes
            .get_mut(target.volume())
            .ok_or_else(|| StoreError::UnknownVolume(target.volume().to_string()))?;

        match target {
            DestroyTarget::Snapshot { name, .. } => {
                let position = snapshots
                    .iter()
                    .position(|s| &s.name == name)
                    .ok_or_else(|| StoreError::NotFound(target.to_string()))?;
                snapshots.remove(position);
            }
            DestroyTarget::AllSnapshots { .. } => snapshots.clear(),
        }
        Ok(())
    }

    fn send(&self, request: &SendRequest) -> StoreResult<SnapshotStream> {
        self.record(StoreCall::Send(request.clone()));

        let volumes = self.inner.volumes.read();
        let snapshots = volumes
            .get(&request.volume)
            .ok_or_else(|| StoreError::UnknownVolume(request.volume.clone()))?;

        let position_of = |name: &str| {
            snapshots
                .iter()
                .position(|s| s.name == name)
                .ok_or_else(|| StoreError::NotFound(format!("{}@{}", request.volume, name)))
        };

        let to = position_of(&request.to)?;
        let (base, start) = match &request.from {
            None => (None, to),
            Some(from) => {
                let from = position_of(from)?;
                if from >= to {
                    return Err(StoreError::StreamRejected(format!(
                        "{} is not older than {}",
                        snapshots[from].name, request.to
                    )));
                }
                let base = StreamBase {
                    name: snapshots[from].name.clone(),
                    created: snapshots[from].created,
                };
                (Some(base), from + 1)
            }
        };

        let package = StreamPackage {
            base,
            snapshots: snapshots[start..=to].to_vec(),
        };
        let data = if self.has_fault(&Fault::EmptyStream) {
            Vec::new()
        } else {
            serde_json::to_vec(&package).map_err(io::Error::from)?
        };

        Ok(Box::new(MemoryStream {
            data: Cursor::new(data),
            fail_after_first_read: self.has_fault(&Fault::ReadError),
            reads: 0,
        }))
    }

    fn receive(&self, target_volume: &str) -> StoreResult<Box<dyn SnapshotSink>> {
        self.record(StoreCall::Receive(target_volume.to_string()));

        Ok(Box::new(MemorySink {
            inner: Arc::clone(&self.inner),
            target: target_volume.to_string(),
            buffer: Vec::new(),
            short_write: self.has_fault(&Fault::ShortWrite),
            write_error: self.has_fault(&Fault::WriteError),
            rejected: self.has_fault(&Fault::ReceiveRejected),
        }))
    }

    fn rollback(&self, volume: &str, snapshot: &str, recursive: bool) -> StoreResult<()> {
        self.record(StoreCall::Rollback(format!("{volume}@{snapshot}")));

        let mut volumes = self.inner.volumes.write();
        let snapshots = volumes
            .get_mut(volume)
            .ok_or_else(|| StoreError::UnknownVolume(volume.to_string()))?;

        let position = snapshots
            .iter()
            .position(|s| s.name == snapshot)
            .ok_or_else(|| StoreError::NotFound(format!("{volume}@{snapshot}")))?;

        if !recursive && position + 1 < snapshots.len() {
            return Err(StoreError::CommandFailed {
                command: format!("rollback {volume}@{snapshot}"),
                stderr: "more recent snapshots exist; use -r to force deletion".into(),
            });
        }

        snapshots.truncate(position + 1);
        Ok(())
    }
}

struct MemoryStream {
    data: Cursor<Vec<u8>>,
    fail_after_first_read: bool,
    reads: usize,
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.fail_after_first_read && self.reads > 0 {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "producer terminated unexpectedly",
            ));
        }
        self.reads += 1;
        self.data.read(buf)
    }
}

struct MemorySink {
    inner: Arc<Inner>,
    target: String,
    buffer: Vec<u8>,
    short_write: bool,
    write_error: bool,
    rejected: bool,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.write_error {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "consumer terminated unexpectedly",
            ));
        }
        let accepted = if self.short_write {
            buf.len().saturating_sub(1)
        } else {
            buf.len()
        };
        self.buffer.extend_from_slice(&buf[..accepted]);
        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SnapshotSink for MemorySink {
    fn finish(self: Box<Self>) -> StoreResult<()> {
        if self.rejected {
            return Err(StoreError::StreamRejected(format!(
                "receive into {} exited with status 1",
                self.target
            )));
        }

        // An empty stream carries nothing to apply.
        if self.buffer.is_empty() {
            return Ok(());
        }

        let package: StreamPackage = serde_json::from_slice(&self.buffer)
            .map_err(|e| StoreError::StreamRejected(format!("invalid stream: {e}")))?;

        let mut volumes = self.inner.volumes.write();
        let snapshots = volumes.entry(self.target.clone()).or_default();

        let kept = match &package.base {
            Some(base) => {
                let position = snapshots
                    .iter()
                    .position(|s| s.matches(&base.name, base.created))
                    .ok_or_else(|| {
                        StoreError::StreamRejected(format!(
                            "destination {} does not have base snapshot {}",
                            self.target, base.name
                        ))
                    })?;
                position + 1
            }
            None if snapshots.is_empty() => 0,
            None => {
                return Err(StoreError::StreamRejected(format!(
                    "destination {} has snapshots",
                    self.target
                )));
            }
        };

        if let Some(duplicate) = package
            .snapshots
            .iter()
            .find(|incoming| snapshots[..kept].iter().any(|s| s.name == incoming.name))
        {
            return Err(StoreError::AlreadyExists(format!(
                "{}@{}",
                self.target, duplicate.name
            )));
        }

        snapshots.truncate(kept);
        snapshots.extend(package.snapshots);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay(store: &InMemoryStore, request: &SendRequest, target: &str) -> StoreResult<()> {
        let mut stream = store.send(request)?;
        let mut sink = store.receive(target)?;
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;
        sink.write_all(&bytes)?;
        sink.finish()
    }

    #[test]
    fn list_reports_prefixed_identifiers_in_order() {
        let store = InMemoryStore::new();
        store.seed("tank", "a", 100);
        store.seed("tank", "b", 200);

        let listing = store.list("tank").unwrap();
        assert_eq!(
            listing,
            vec![
                ListingEntry::new("tank@a", "100"),
                ListingEntry::new("tank@b", "200"),
            ]
        );
    }

    #[test]
    fn list_unknown_volume_fails() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.list("missing"),
            Err(StoreError::UnknownVolume(_))
        ));
    }

    #[test]
    fn create_stamps_from_clock_and_rejects_duplicates() {
        let store = InMemoryStore::with_volumes(["tank"]);
        store.set_clock(500);
        store.create("tank", "a").unwrap();
        store.create("tank", "b").unwrap();

        let snapshots = store.snapshots("tank");
        assert_eq!(snapshots[0].created, 500);
        assert_eq!(snapshots[1].created, 501);

        assert!(matches!(
            store.create("tank", "a"),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn destroy_single_and_all() {
        let store = InMemoryStore::new();
        store.seed("tank", "a", 1);
        store.seed("tank", "b", 2);

        store.destroy(&DestroyTarget::snapshot("tank", "a")).unwrap();
        assert_eq!(store.snapshot_names("tank"), vec!["b"]);

        assert!(matches!(
            store.destroy(&DestroyTarget::snapshot("tank", "a")),
            Err(StoreError::NotFound(_))
        ));

        store.destroy(&DestroyTarget::all("tank")).unwrap();
        assert!(store.snapshots("tank").is_empty());
        assert_eq!(store.destroy_count(), 3);
    }

    #[test]
    fn full_stream_into_empty_volume() {
        let store = InMemoryStore::with_volumes(["backup"]);
        store.seed("tank", "a", 100);
        store.seed("tank", "b", 200);

        relay(&store, &SendRequest::full("tank", "b"), "backup").unwrap();
        assert_eq!(store.snapshot_names("backup"), vec!["b"]);
    }

    #[test]
    fn full_stream_into_populated_volume_is_rejected() {
        let store = InMemoryStore::new();
        store.seed("tank", "a", 100);
        store.seed("backup", "z", 50);

        let result = relay(&store, &SendRequest::full("tank", "a"), "backup");
        assert!(matches!(result, Err(StoreError::StreamRejected(_))));
        assert_eq!(store.snapshot_names("backup"), vec!["z"]);
    }

    #[test]
    fn incremental_stream_carries_the_range() {
        let store = InMemoryStore::new();
        store.seed("tank", "a", 100);
        store.seed("tank", "b", 200);
        store.seed("tank", "c", 300);
        store.seed("backup", "a", 100);

        relay(&store, &SendRequest::incremental("tank", "a", "c"), "backup").unwrap();
        assert_eq!(store.snapshot_names("backup"), vec!["a", "b", "c"]);
    }

    #[test]
    fn incremental_stream_needs_matching_base() {
        let store = InMemoryStore::new();
        store.seed("tank", "a", 100);
        store.seed("tank", "b", 200);
        store.seed("backup", "a", 999);

        let result = relay(&store, &SendRequest::incremental("tank", "a", "b"), "backup");
        assert!(matches!(result, Err(StoreError::StreamRejected(_))));
    }

    #[test]
    fn incremental_receive_discards_diverged_tail() {
        let store = InMemoryStore::new();
        store.seed("tank", "a", 100);
        store.seed("tank", "b", 200);
        store.seed("backup", "a", 100);
        store.seed("backup", "stray", 150);

        relay(&store, &SendRequest::incremental("tank", "a", "b"), "backup").unwrap();
        assert_eq!(store.snapshot_names("backup"), vec!["a", "b"]);
    }

    #[test]
    fn send_rejects_inverted_range() {
        let store = InMemoryStore::new();
        store.seed("tank", "a", 100);
        store.seed("tank", "b", 200);

        assert!(store
            .send(&SendRequest::incremental("tank", "b", "a"))
            .is_err());
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let store = InMemoryStore::with_volumes(["backup"]);
        store.seed("tank", "a", 100);
        store.inject(Fault::ShortWrite);

        let result = relay(&store, &SendRequest::full("tank", "a"), "backup");
        assert!(result.is_err());
        assert!(store.snapshots("backup").is_empty());
    }

    #[test]
    fn write_fault_fails_every_write() {
        let store = InMemoryStore::with_volumes(["backup"]);
        store.seed("tank", "a", 100);
        store.inject(Fault::WriteError);

        let mut sink = store.receive("backup").unwrap();
        let err = sink.write(b"data").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(relay(&store, &SendRequest::full("tank", "a"), "backup").is_err());
        assert!(store.snapshots("backup").is_empty());
    }

    #[test]
    fn read_fault_fails_after_first_read() {
        let store = InMemoryStore::new();
        store.seed("tank", "a", 100);
        store.inject(Fault::ReadError);

        let mut stream = store.send(&SendRequest::full("tank", "a")).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), 4);
        assert!(stream.read(&mut buf).is_err());
    }

    #[test]
    fn rollback_requires_recursive_for_later_snapshots() {
        let store = InMemoryStore::new();
        store.seed("tank", "a", 100);
        store.seed("tank", "b", 200);

        assert!(store.rollback("tank", "a", false).is_err());
        store.rollback("tank", "a", true).unwrap();
        assert_eq!(store.snapshot_names("tank"), vec!["a"]);
    }

    #[test]
    fn malformed_listing_fault() {
        let store = InMemoryStore::new();
        store.seed("tank", "a", 100);
        store.inject(Fault::MalformedListing("tank".into()));

        let listing = store.list("tank").unwrap();
        assert_eq!(listing[0].creation, "-");

        store.clear_faults();
        assert_eq!(store.list("tank").unwrap()[0].creation, "100");
    }

    #[test]
    fn clones_share_state() {
        let store = InMemoryStore::with_volumes(["tank"]);
        let handle = store.clone();
        store.create("tank", "a").unwrap();
        assert_eq!(handle.snapshot_names("tank"), vec!["a"]);
        assert_eq!(
            handle.calls(),
            vec![StoreCall::Create("tank@a".into())]
        );
    }
}
