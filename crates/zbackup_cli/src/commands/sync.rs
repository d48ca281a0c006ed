//! One-way sync of the primary pool to the backup pool.

use tracing::info;
use zbackup_engine::BackupEngine;
use zbackup_store::SnapshotStore;

/// Copies every pending snapshot to the backup pool.
pub fn run<S: SnapshotStore>(engine: &BackupEngine<S>) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = engine.sync()?;
    info!(
        transfers = outcome.transfers.len(),
        bytes = outcome.bytes_transferred(),
        "sync finished"
    );
    Ok(())
}
