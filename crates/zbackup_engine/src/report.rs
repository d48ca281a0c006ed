//! Progress reporting and confirmation seams.
//!
//! The engine never prints or reads the terminal itself. Front ends plug in a
//! [`Reporter`] to surface progress and a [`Confirmer`] to answer destructive
//! prompts.

use crate::catalog::Catalog;
use crate::engine::SyncOutcome;
use crate::reconcile::TransferMode;
use crate::snapshot::Snapshot;
use crate::transfer::{TransferRequest, TransferStats};
use parking_lot::Mutex;
use std::io;
use tracing::{debug, info, trace, warn};

/// Receives engine events. Every method defaults to doing nothing.
pub trait Reporter: Send + Sync {
    /// A sync run is starting. Replication is one-way, primary to backup.
    fn sync_started(&self, _primary: &str, _backup: &str) {}

    /// Result of the first reconciliation of a sync run.
    fn reconciled(&self, _checkpoint: Option<&Snapshot>, _pending: Option<&Snapshot>) {}

    /// A transfer is starting.
    fn transfer_started(&self, _request: &TransferRequest) {}

    /// Total bytes relayed so far by the running transfer.
    fn transfer_progress(&self, _bytes: u64) {}

    /// A transfer completed and the consumer confirmed it.
    fn transfer_finished(&self, _request: &TransferRequest, _stats: &TransferStats) {}

    /// A catalog was reloaded after a sync run.
    fn catalog_refreshed(&self, _catalog: &Catalog) {}

    /// A sync run converged.
    fn sync_finished(&self, _outcome: &SyncOutcome) {}

    /// A snapshot was created on a volume.
    fn snapshot_created(&self, _volume: &str, _name: &str) {}

    /// A snapshot, or every snapshot of a volume, was destroyed.
    fn snapshot_destroyed(&self, _target: &str) {}

    /// A volume was restored or rolled back to a snapshot.
    fn restore_finished(&self, _source: &str, _volume: &str) {}

    /// The user declined a destructive operation.
    fn cancelled(&self, _operation: &str) {}
}

/// A reporter that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl Reporter for NoopReporter {}

/// A reporter that logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn sync_started(&self, primary: &str, backup: &str) {
        info!(primary, backup, "starting one-way sync");
    }

    fn reconciled(&self, checkpoint: Option<&Snapshot>, pending: Option<&Snapshot>) {
        info!(
            checkpoint = checkpoint.map(Snapshot::name).unwrap_or(""),
            pending = pending.map(Snapshot::name).unwrap_or(""),
            "reconciled snapshot histories"
        );
    }

    fn transfer_started(&self, request: &TransferRequest) {
        match &request.mode {
            TransferMode::Full => info!(
                snapshot = request.snapshot.name(),
                target = %request.target_volume,
                "starting full transfer"
            ),
            TransferMode::Delta { from } => info!(
                snapshot = request.snapshot.name(),
                from = from.name(),
                target = %request.target_volume,
                "starting incremental transfer"
            ),
        }
    }

    fn transfer_progress(&self, bytes: u64) {
        trace!(bytes, "transfer progress");
    }

    fn transfer_finished(&self, request: &TransferRequest, stats: &TransferStats) {
        info!(
            snapshot = request.snapshot.name(),
            bytes = stats.bytes,
            chunks = stats.chunks,
            elapsed_ms = stats.duration.as_millis() as u64,
            "transfer complete"
        );
    }

    fn catalog_refreshed(&self, catalog: &Catalog) {
        debug!(
            volume = catalog.volume(),
            snapshots = catalog.len(),
            "catalog refreshed"
        );
    }

    fn sync_finished(&self, outcome: &SyncOutcome) {
        info!(
            transfers = outcome.transfers.len(),
            bytes = outcome.bytes_transferred(),
            "sync done"
        );
    }

    fn snapshot_created(&self, volume: &str, name: &str) {
        info!(volume, name, "snapshot created");
    }

    fn snapshot_destroyed(&self, target: &str) {
        warn!(target, "snapshot destroyed");
    }

    fn restore_finished(&self, source: &str, volume: &str) {
        info!(source, volume, "restore complete");
    }

    fn cancelled(&self, operation: &str) {
        info!(operation, "cancelled by user");
    }
}

/// Answers destructive-operation prompts.
pub trait Confirmer: Send + Sync {
    /// Shows `prompt` and returns the raw answer.
    ///
    /// # Errors
    ///
    /// Returns an error if no answer could be read.
    fn ask(&self, prompt: &str) -> io::Result<String>;
}

/// Returns true for `y` or `yes`, ignoring case and surrounding whitespace.
pub fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}

/// A confirmer that answers yes without asking.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirmer for AssumeYes {
    fn ask(&self, _prompt: &str) -> io::Result<String> {
        Ok("yes".to_string())
    }
}

/// A confirmer that gives a fixed answer and remembers what it was asked.
#[derive(Debug, Default)]
pub struct ScriptedConfirmer {
    answer: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirmer {
    /// Creates a confirmer that always answers `answer`.
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts shown so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl Confirmer for ScriptedConfirmer {
    fn ask(&self, prompt: &str) -> io::Result<String> {
        self.prompts.lock().push(prompt.to_string());
        Ok(self.answer.clone())
    }
}
