//! Backup engine state machine and sync orchestration.

use crate::catalog::Catalog;
use crate::config::BackupConfig;
use crate::error::{BackupError, BackupResult};
use crate::reconcile::{reconcile, TransferMode};
use crate::report::{Reporter, TracingReporter};
use crate::snapshot::{validate_snapshot_name, Snapshot};
use crate::transfer::{TransferPipeline, TransferRequest, TransferStats};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use zbackup_store::{SnapshotStore, StoreError};

/// The current state of the backup engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No operation has run yet.
    Idle,
    /// Loading and comparing catalogs.
    Reconciling,
    /// Relaying a snapshot stream.
    Transferring,
    /// The last operation completed.
    Synced,
    /// The last operation failed.
    Error,
}

impl EngineState {
    /// Returns true while an operation is running.
    pub fn is_active(&self) -> bool {
        matches!(self, EngineState::Reconciling | EngineState::Transferring)
    }

    /// Returns true if a new operation may start.
    pub fn can_start(&self) -> bool {
        !self.is_active()
    }
}

/// Statistics about engine operations.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Completed sync runs.
    pub sync_runs: u64,
    /// Snapshots successfully transferred.
    pub snapshots_transferred: u64,
    /// Bytes relayed by successful transfers.
    pub bytes_transferred: u64,
    /// When the last sync run completed.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// One completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    /// Snapshot that was copied.
    pub snapshot: Snapshot,
    /// How it was copied.
    pub mode: TransferMode,
    /// Byte accounting.
    pub stats: TransferStats,
}

/// Result of a sync run.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Transfers performed, in order.
    pub transfers: Vec<TransferRecord>,
    /// Primary catalog after the run.
    pub primary: Catalog,
    /// Backup catalog after the run.
    pub backup: Catalog,
    /// Duration of the run.
    pub duration: Duration,
}

impl SyncOutcome {
    /// Total bytes relayed during the run.
    pub fn bytes_transferred(&self) -> u64 {
        self.transfers.iter().map(|t| t.stats.bytes).sum()
    }

    /// Returns true if the backup was already up to date.
    pub fn is_noop(&self) -> bool {
        self.transfers.is_empty()
    }
}

/// Result of [`BackupEngine::create_backup`].
#[derive(Debug, Clone)]
pub struct CreateBackupOutcome {
    /// Name of the new snapshot.
    pub name: String,
    /// Sync run that drained the backlog before creation.
    pub backlog: SyncOutcome,
    /// Sync run that pushed the new snapshot.
    pub push: SyncOutcome,
}

/// One line of the merged listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRow {
    /// The snapshot value.
    pub snapshot: Snapshot,
    /// Present on the primary.
    pub on_primary: bool,
    /// Present on the backup.
    pub on_backup: bool,
}

/// Drives one-way replication from the primary volume to the backup volume.
///
/// Only one operation runs at a time per engine; a second caller gets
/// [`BackupError::Busy`].
pub struct BackupEngine<S: SnapshotStore> {
    config: BackupConfig,
    store: Arc<S>,
    pipeline: TransferPipeline,
    reporter: Arc<dyn Reporter>,
    state: RwLock<EngineState>,
    stats: RwLock<EngineStats>,
}

impl<S: SnapshotStore> BackupEngine<S> {
    /// Creates a new backup engine.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::InvalidConfig`] if the configuration is unusable.
    pub fn new(config: BackupConfig, store: S) -> BackupResult<Self> {
        config.validate()?;
        Ok(Self {
            pipeline: TransferPipeline::new(config.chunk_size),
            config,
            store: Arc::new(store),
            reporter: Arc::new(TracingReporter),
            state: RwLock::new(EngineState::Idle),
            stats: RwLock::new(EngineStats::default()),
        })
    }

    /// Replaces the event reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Gets the configuration.
    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Gets the snapshot store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Gets the current state.
    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> EngineStats {
        self.stats.read().clone()
    }

    pub(crate) fn reporter(&self) -> &dyn Reporter {
        self.reporter.as_ref()
    }

    pub(crate) fn set_state(&self, state: EngineState) {
        *self.state.write() = state;
    }

    /// Claims the engine for one operation and runs it.
    ///
    /// Errors caused by the request restore the previous state; anything else
    /// leaves the engine in [`EngineState::Error`].
    pub(crate) fn run<T>(&self, operation: impl FnOnce() -> BackupResult<T>) -> BackupResult<T> {
        let previous = {
            let mut state = self.state.write();
            if !state.can_start() {
                return Err(BackupError::Busy {
                    state: format!("{:?}", *state),
                });
            }
            std::mem::replace(&mut *state, EngineState::Reconciling)
        };

        match operation() {
            Ok(value) => {
                self.set_state(EngineState::Synced);
                Ok(value)
            }
            Err(e) => {
                self.handle_error(&e, previous);
                Err(e)
            }
        }
    }

    /// Copies every pending snapshot from the primary to the backup.
    ///
    /// # Errors
    ///
    /// Fails on the first catalog, transfer or stall error. Snapshots
    /// transferred before the failure stay on the backup.
    pub fn sync(&self) -> BackupResult<SyncOutcome> {
        self.run(|| self.sync_loop())
    }

    /// Creates snapshot `name` on the primary and replicates it.
    ///
    /// Any backlog is drained first so the new snapshot goes across as a
    /// delta against an up-to-date checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::NameCollision`] without side effects if either
    /// volume already has a snapshot named `name`. A failed creation aborts
    /// before the second sync.
    pub fn create_backup(&self, name: &str) -> BackupResult<CreateBackupOutcome> {
        validate_snapshot_name(name)?;
        self.run(|| {
            for volume in [&self.config.primary, &self.config.backup] {
                if Catalog::load(self.store.as_ref(), volume)?.contains_name(name) {
                    return Err(BackupError::NameCollision {
                        volume: volume.clone(),
                        name: name.to_string(),
                    });
                }
            }

            let backlog = self.sync_loop()?;

            self.store
                .create(&self.config.primary, name)
                .map_err(|e| match e {
                    StoreError::AlreadyExists(_) => BackupError::NameCollision {
                        volume: self.config.primary.clone(),
                        name: name.to_string(),
                    },
                    other => BackupError::Store(other),
                })?;
            self.reporter.snapshot_created(&self.config.primary, name);

            let push = self.sync_loop()?;
            Ok(CreateBackupOutcome {
                name: name.to_string(),
                backlog,
                push,
            })
        })
    }

    /// Merged view of both volumes for display.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::CatalogUnavailable`] if either listing fails.
    pub fn list(&self) -> BackupResult<Vec<SnapshotRow>> {
        let primary = Catalog::load(self.store.as_ref(), &self.config.primary)?;
        let backup = Catalog::load(self.store.as_ref(), &self.config.backup)?;

        Ok(primary
            .merge(&backup)
            .into_iter()
            .map(|snapshot| SnapshotRow {
                on_primary: primary.contains(&snapshot),
                on_backup: backup.contains(&snapshot),
                snapshot,
            })
            .collect())
    }

    /// Runs one transfer and accounts for it.
    pub(crate) fn transfer(&self, request: &TransferRequest) -> BackupResult<TransferStats> {
        self.set_state(EngineState::Transferring);
        self.reporter.transfer_started(request);

        let stats = self
            .pipeline
            .run(self.store.as_ref(), request, self.reporter.as_ref())
            .map_err(|error| BackupError::TransferFailure {
                snapshot: request.snapshot.name().to_string(),
                error,
            })?;

        self.reporter.transfer_finished(request, &stats);
        {
            let mut engine_stats = self.stats.write();
            engine_stats.snapshots_transferred += 1;
            engine_stats.bytes_transferred += stats.bytes;
        }
        Ok(stats)
    }

    /// Reconcile-transfer loop, run until nothing is pending.
    fn sync_loop(&self) -> BackupResult<SyncOutcome> {
        let start = Instant::now();
        let primary_volume = &self.config.primary;
        let backup_volume = &self.config.backup;
        self.reporter.sync_started(primary_volume, backup_volume);

        let mut transfers: Vec<TransferRecord> = Vec::new();
        let mut first_round = true;

        loop {
            self.set_state(EngineState::Reconciling);
            let primary = Catalog::load(self.store.as_ref(), primary_volume)?;
            let backup = Catalog::load(self.store.as_ref(), backup_volume)?;
            let plan = reconcile(&primary, &backup);

            if first_round {
                self.reporter
                    .reconciled(plan.checkpoint.as_ref(), plan.pending.as_ref());
                first_round = false;
            }

            let Some((snapshot, mode)) = plan.next_transfer() else {
                break;
            };

            // A successful transfer must make its snapshot appear on the backup.
            if transfers.last().is_some_and(|t| t.snapshot == snapshot) {
                return Err(BackupError::ReplicationStalled {
                    snapshot: snapshot.name().to_string(),
                });
            }

            debug!(snapshot = %snapshot, delta = mode.is_delta(), "next snapshot to replicate");
            let request = TransferRequest {
                source_volume: primary_volume.clone(),
                target_volume: backup_volume.clone(),
                snapshot,
                mode,
            };
            let stats = self.transfer(&request)?;
            transfers.push(TransferRecord {
                snapshot: request.snapshot,
                mode: request.mode,
                stats,
            });
        }

        let primary = Catalog::load(self.store.as_ref(), primary_volume)?;
        let backup = Catalog::load(self.store.as_ref(), backup_volume)?;
        self.reporter.catalog_refreshed(&primary);
        self.reporter.catalog_refreshed(&backup);

        let outcome = SyncOutcome {
            transfers,
            primary,
            backup,
            duration: start.elapsed(),
        };

        {
            let mut stats = self.stats.write();
            stats.sync_runs += 1;
            stats.last_sync_time = Some(Instant::now());
            stats.last_error = None;
        }
        info!(
            transfers = outcome.transfers.len(),
            elapsed_ms = outcome.duration.as_millis() as u64,
            "sync loop converged"
        );
        self.reporter.sync_finished(&outcome);
        Ok(outcome)
    }

    /// Handles an error by updating state and stats.
    fn handle_error(&self, error: &BackupError, previous: EngineState) {
        if error.is_user_error() {
            self.set_state(previous);
        } else {
            self.set_state(EngineState::Error);
        }
        self.stats.write().last_error = Some(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zbackup_store::{Fault, InMemoryStore, StoreCall};

    fn engine(store: &InMemoryStore) -> BackupEngine<InMemoryStore> {
        BackupEngine::new(BackupConfig::new("tank", "backup"), store.clone()).unwrap()
    }

    #[test]
    fn engine_state_checks() {
        assert!(EngineState::Idle.can_start());
        assert!(EngineState::Synced.can_start());
        assert!(EngineState::Error.can_start());
        assert!(!EngineState::Reconciling.can_start());
        assert!(!EngineState::Transferring.can_start());

        assert!(EngineState::Transferring.is_active());
        assert!(!EngineState::Idle.is_active());
    }

    #[test]
    fn engine_initial_state() {
        let store = InMemoryStore::with_volumes(["tank", "backup"]);
        let engine = engine(&store);
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(engine.stats().sync_runs, 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let store = InMemoryStore::new();
        assert!(matches!(
            BackupEngine::new(BackupConfig::new("tank", "tank"), store),
            Err(BackupError::InvalidConfig(_))
        ));
    }

    #[test]
    fn sync_drains_backlog_in_creation_order() {
        let store = InMemoryStore::with_volumes(["tank", "backup"]);
        store.seed("tank", "s1", 100);
        store.seed("tank", "s2", 200);
        store.seed("tank", "s3", 300);
        let engine = engine(&store);

        let outcome = engine.sync().unwrap();

        let copied: Vec<_> = outcome
            .transfers
            .iter()
            .map(|t| (t.snapshot.name().to_string(), t.mode.is_delta()))
            .collect();
        assert_eq!(
            copied,
            vec![
                ("s1".to_string(), false),
                ("s2".to_string(), true),
                ("s3".to_string(), true)
            ]
        );
        assert_eq!(outcome.backup.len(), 3);
        assert_eq!(engine.state(), EngineState::Synced);
        assert_eq!(engine.stats().snapshots_transferred, 3);
        assert_eq!(engine.stats().sync_runs, 1);
    }

    #[test]
    fn busy_engine_rejects_second_operation() {
        let store = InMemoryStore::with_volumes(["tank", "backup"]);
        let engine = engine(&store);
        engine.set_state(EngineState::Transferring);

        assert!(matches!(engine.sync(), Err(BackupError::Busy { .. })));
        assert!(store.calls().is_empty());
    }

    #[test]
    fn failed_sync_records_error() {
        let store = InMemoryStore::with_volumes(["tank", "backup"]);
        store.seed("tank", "s1", 100);
        store.inject(Fault::ReceiveRejected);
        let engine = engine(&store);

        let err = engine.sync().unwrap_err();
        assert!(matches!(err, BackupError::TransferFailure { .. }));
        assert_eq!(engine.state(), EngineState::Error);
        assert!(engine.stats().last_error.is_some());

        store.clear_faults();
        engine.sync().unwrap();
        assert_eq!(engine.state(), EngineState::Synced);
        assert!(engine.stats().last_error.is_none());
    }

    #[test]
    fn name_collision_keeps_previous_state() {
        let store = InMemoryStore::with_volumes(["tank", "backup"]);
        store.seed("tank", "nightly", 100);
        let engine = engine(&store);

        assert!(matches!(
            engine.create_backup("nightly"),
            Err(BackupError::NameCollision { .. })
        ));
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(store.send_count(), 0);
    }

    #[test]
    fn invalid_name_never_touches_store() {
        let store = InMemoryStore::with_volumes(["tank", "backup"]);
        let engine = engine(&store);

        assert!(matches!(
            engine.create_backup("a@b"),
            Err(BackupError::InvalidSnapshotName(_))
        ));
        assert!(store.calls().is_empty());
    }

    #[test]
    fn create_failure_aborts_before_push() {
        let store = InMemoryStore::with_volumes(["tank", "backup"]);
        store.inject(Fault::CreateRejected);
        let engine = engine(&store);

        assert!(matches!(
            engine.create_backup("nightly"),
            Err(BackupError::Store(_))
        ));
        assert_eq!(
            store
                .calls()
                .iter()
                .filter(|c| matches!(c, StoreCall::Receive(_)))
                .count(),
            0
        );
    }

    #[test]
    fn list_marks_presence_per_volume() {
        let store = InMemoryStore::with_volumes(["tank", "backup"]);
        store.seed("tank", "shared", 100);
        store.seed("tank", "local", 200);
        store.seed("backup", "shared", 100);
        store.seed("backup", "archived", 50);
        let engine = engine(&store);

        let rows = engine.list().unwrap();
        let summary: Vec<_> = rows
            .iter()
            .map(|r| (r.snapshot.name(), r.on_primary, r.on_backup))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("shared", true, true),
                ("local", true, false),
                ("archived", false, true)
            ]
        );
    }
}
