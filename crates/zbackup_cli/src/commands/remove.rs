//! Snapshot removal.

use zbackup_engine::{BackupEngine, Confirmer, RemoveScope};
use zbackup_store::SnapshotStore;

/// Picks the removal scope from the `--primary` and `--backup` flags.
pub fn scope(primary: bool, backup: bool) -> RemoveScope {
    match (primary, backup) {
        (true, false) => RemoveScope::Primary,
        (false, true) => RemoveScope::Backup,
        _ => RemoveScope::Everywhere,
    }
}

/// Deletes snapshot `name` from the pools selected by `scope`.
pub fn run<S: SnapshotStore>(
    engine: &BackupEngine<S>,
    name: &str,
    scope: RemoveScope,
    confirmer: &dyn Confirmer,
) -> Result<(), Box<dyn std::error::Error>> {
    engine.remove_snapshot(name, scope, confirmer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_select_scope() {
        assert_eq!(scope(true, false), RemoveScope::Primary);
        assert_eq!(scope(false, true), RemoveScope::Backup);
        assert_eq!(scope(false, false), RemoveScope::Everywhere);
    }
}
