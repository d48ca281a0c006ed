//! Snapshot creation followed by replication.

use tracing::info;
use zbackup_engine::BackupEngine;
use zbackup_store::SnapshotStore;

/// Creates snapshot `name` on the primary pool and pushes it to the backup.
pub fn run<S: SnapshotStore>(
    engine: &BackupEngine<S>,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = engine.create_backup(name)?;
    info!(
        name = %outcome.name,
        backlog = outcome.backlog.transfers.len(),
        "backup created"
    );
    Ok(())
}
