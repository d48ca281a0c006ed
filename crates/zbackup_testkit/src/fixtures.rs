//! Test fixtures and engine helpers.
//!
//! Provides a primary/backup pair on an in-memory store with a reporter
//! that records every event.

use parking_lot::Mutex;
use std::sync::Arc;
use zbackup_engine::{
    BackupConfig, BackupEngine, Catalog, Reporter, Snapshot, SyncOutcome, TransferRequest,
    TransferStats,
};
use zbackup_store::InMemoryStore;

/// Primary volume used by fixtures.
pub const PRIMARY: &str = "tank";

/// Backup volume used by fixtures.
pub const BACKUP: &str = "backup/tank";

/// Builds a snapshot value.
pub fn snapshot(name: &str, created_at: i64) -> Snapshot {
    Snapshot::new(name, created_at)
}

/// Builds a catalog from `(name, created_at)` pairs.
pub fn catalog(volume: &str, snapshots: &[(&str, i64)]) -> Catalog {
    Catalog::from_snapshots(
        volume,
        snapshots
            .iter()
            .map(|(name, created_at)| Snapshot::new(*name, *created_at))
            .collect(),
    )
}

/// An event seen by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    /// `sync_started`.
    SyncStarted,
    /// `reconciled`, with snapshot names.
    Reconciled {
        /// Checkpoint name.
        checkpoint: Option<String>,
        /// Pending name.
        pending: Option<String>,
    },
    /// `transfer_started`, with snapshot name and whether it is a delta.
    TransferStarted {
        /// Snapshot name.
        snapshot: String,
        /// Delta or full.
        delta: bool,
    },
    /// `transfer_progress`.
    Progress(u64),
    /// `transfer_finished`, with bytes moved.
    TransferFinished {
        /// Snapshot name.
        snapshot: String,
        /// Bytes moved.
        bytes: u64,
    },
    /// `catalog_refreshed`, with volume.
    CatalogRefreshed(String),
    /// `sync_finished`, with transfer count.
    SyncFinished(usize),
    /// `snapshot_created`, as `volume@name`.
    SnapshotCreated(String),
    /// `snapshot_destroyed`.
    SnapshotDestroyed(String),
    /// `restore_finished`, with source and volume.
    RestoreFinished {
        /// What was restored from.
        source: String,
        /// Volume restored.
        volume: String,
    },
    /// `cancelled`, with operation.
    Cancelled(String),
}

/// A reporter that keeps every event for later assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl RecordingReporter {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events seen so far.
    pub fn events(&self) -> Vec<ReportEvent> {
        self.events.lock().clone()
    }

    /// Events seen so far, without progress updates.
    pub fn milestones(&self) -> Vec<ReportEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| !matches!(e, ReportEvent::Progress(_)))
            .cloned()
            .collect()
    }

    /// Running byte totals reported by transfers.
    pub fn progress(&self) -> Vec<u64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ReportEvent::Progress(bytes) => Some(*bytes),
                _ => None,
            })
            .collect()
    }

    /// Forgets everything recorded.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn push(&self, event: ReportEvent) {
        self.events.lock().push(event);
    }
}

impl Reporter for RecordingReporter {
    fn sync_started(&self, _primary: &str, _backup: &str) {
        self.push(ReportEvent::SyncStarted);
    }

    fn reconciled(&self, checkpoint: Option<&Snapshot>, pending: Option<&Snapshot>) {
        self.push(ReportEvent::Reconciled {
            checkpoint: checkpoint.map(|s| s.name().to_string()),
            pending: pending.map(|s| s.name().to_string()),
        });
    }

    fn transfer_started(&self, request: &TransferRequest) {
        self.push(ReportEvent::TransferStarted {
            snapshot: request.snapshot.name().to_string(),
            delta: request.mode.is_delta(),
        });
    }

    fn transfer_progress(&self, bytes: u64) {
        self.push(ReportEvent::Progress(bytes));
    }

    fn transfer_finished(&self, request: &TransferRequest, stats: &TransferStats) {
        self.push(ReportEvent::TransferFinished {
            snapshot: request.snapshot.name().to_string(),
            bytes: stats.bytes,
        });
    }

    fn catalog_refreshed(&self, catalog: &Catalog) {
        self.push(ReportEvent::CatalogRefreshed(catalog.volume().to_string()));
    }

    fn sync_finished(&self, outcome: &SyncOutcome) {
        self.push(ReportEvent::SyncFinished(outcome.transfers.len()));
    }

    fn snapshot_created(&self, volume: &str, name: &str) {
        self.push(ReportEvent::SnapshotCreated(format!("{volume}@{name}")));
    }

    fn snapshot_destroyed(&self, target: &str) {
        self.push(ReportEvent::SnapshotDestroyed(target.to_string()));
    }

    fn restore_finished(&self, source: &str, volume: &str) {
        self.push(ReportEvent::RestoreFinished {
            source: source.to_string(),
            volume: volume.to_string(),
        });
    }

    fn cancelled(&self, operation: &str) {
        self.push(ReportEvent::Cancelled(operation.to_string()));
    }
}

/// A primary/backup volume pair on a shared in-memory store.
pub struct TestPair {
    /// Handle on the store the engine drives.
    pub store: InMemoryStore,
    /// The engine under test.
    pub engine: BackupEngine<InMemoryStore>,
    /// Events reported by the engine.
    pub reporter: Arc<RecordingReporter>,
}

impl TestPair {
    /// Creates empty [`PRIMARY`] and [`BACKUP`] volumes.
    pub fn new() -> Self {
        Self::with_config(BackupConfig::new(PRIMARY, BACKUP))
    }

    /// Creates a pair whose transfers relay `chunk_size` bytes at a time.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self::with_config(BackupConfig::new(PRIMARY, BACKUP).with_chunk_size(chunk_size))
    }

    fn with_config(config: BackupConfig) -> Self {
        let store = InMemoryStore::with_volumes([config.primary.clone(), config.backup.clone()]);
        let reporter = Arc::new(RecordingReporter::new());
        let engine = BackupEngine::new(config, store.clone())
            .expect("fixture config is valid")
            .with_reporter(reporter.clone());
        Self {
            store,
            engine,
            reporter,
        }
    }

    /// Seeds `(name, created_at)` snapshots on the primary.
    pub fn seed_primary(&self, snapshots: &[(&str, i64)]) -> &Self {
        for (name, created_at) in snapshots {
            self.store.seed(PRIMARY, name, *created_at);
        }
        self
    }

    /// Seeds `(name, created_at)` snapshots on the backup.
    pub fn seed_backup(&self, snapshots: &[(&str, i64)]) -> &Self {
        for (name, created_at) in snapshots {
            self.store.seed(BACKUP, name, *created_at);
        }
        self
    }

    /// Snapshot names on the primary, in order.
    pub fn primary_names(&self) -> Vec<String> {
        self.store.snapshot_names(PRIMARY)
    }

    /// Snapshot names on the backup, in order.
    pub fn backup_names(&self) -> Vec<String> {
        self.store.snapshot_names(BACKUP)
    }
}

impl Default for TestPair {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test against a fresh [`TestPair`].
///
/// # Example
///
/// ```rust
/// use zbackup_testkit::with_pair;
///
/// with_pair(|pair| {
///     pair.seed_primary(&[("s1", 100)]);
///     pair.engine.sync().unwrap();
///     assert_eq!(pair.backup_names(), vec!["s1"]);
/// });
/// ```
pub fn with_pair<F, R>(f: F) -> R
where
    F: FnOnce(&TestPair) -> R,
{
    let pair = TestPair::new();
    f(&pair)
}
