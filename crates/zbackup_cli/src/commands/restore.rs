//! Restore commands.
//!
//! Both commands destroy data on the primary pool and ask first unless
//! `--yes` was given.

use zbackup_engine::{BackupEngine, Confirmer, SnapshotRef};
use zbackup_store::SnapshotStore;

/// Replaces the primary pool with `reference` (`pool@snapshot`) from
/// another pool.
pub fn from_backup<S: SnapshotStore>(
    engine: &BackupEngine<S>,
    reference: &str,
    confirmer: &dyn Confirmer,
) -> Result<(), Box<dyn std::error::Error>> {
    let reference = SnapshotRef::parse(reference)?;
    engine.restore_from_backup(&reference, confirmer)?;
    Ok(())
}

/// Rolls the primary pool back to its own snapshot `name`.
pub fn to_snapshot<S: SnapshotStore>(
    engine: &BackupEngine<S>,
    name: &str,
    confirmer: &dyn Confirmer,
) -> Result<(), Box<dyn std::error::Error>> {
    engine.restore_to_snapshot(name, confirmer)?;
    Ok(())
}
