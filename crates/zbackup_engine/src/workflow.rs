//! Destructive workflows: restore, rollback and removal.
//!
//! Every workflow asks its [`Confirmer`] before touching data. Anything but
//! an affirmative answer returns [`WorkflowOutcome::Cancelled`] with no
//! change made.

use crate::catalog::Catalog;
use crate::engine::BackupEngine;
use crate::error::{BackupError, BackupResult};
use crate::report::{is_affirmative, Confirmer};
use crate::snapshot::SnapshotRef;
use crate::transfer::TransferRequest;
use tracing::{debug, warn};
use zbackup_store::{DestroyTarget, SnapshotStore};

/// How a confirmed destructive workflow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// The operation ran to completion.
    Completed,
    /// The user declined; nothing was changed.
    Cancelled,
}

impl WorkflowOutcome {
    /// Returns true if the user declined.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkflowOutcome::Cancelled)
    }
}

/// Which volumes [`BackupEngine::remove_snapshot`] deletes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveScope {
    /// Only the primary. The snapshot must exist there.
    Primary,
    /// Only the backup. The snapshot must exist there.
    Backup,
    /// Every configured volume holding the snapshot.
    Everywhere,
}

impl<S: SnapshotStore> BackupEngine<S> {
    /// Replaces the primary volume's history with a snapshot from another
    /// volume.
    ///
    /// If the primary holds snapshots they are all destroyed after
    /// confirmation, then `reference` is sent in full into the primary.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::InvalidTarget`] if `reference` names the primary
    /// itself and [`BackupError::SnapshotNotFound`] if the source snapshot is
    /// missing. Neither case deletes anything.
    pub fn restore_from_backup(
        &self,
        reference: &SnapshotRef,
        confirmer: &dyn Confirmer,
    ) -> BackupResult<WorkflowOutcome> {
        let primary = self.config().primary.clone();
        if reference.volume == primary {
            return Err(BackupError::InvalidTarget { volume: primary });
        }

        self.run(|| {
            let source = Catalog::load(self.store(), &reference.volume)?;
            let snapshot = source.by_name(&reference.name).cloned().ok_or_else(|| {
                BackupError::SnapshotNotFound {
                    volume: reference.volume.clone(),
                    name: reference.name.clone(),
                }
            })?;

            if !Catalog::load(self.store(), &primary)?.is_empty() {
                let prompt = format!(
                    "THIS WILL DESTROY ALL DATA ON THE POOL \"{primary}\"! Are you sure? (y/N) "
                );
                if !self.confirm(confirmer, &prompt, "restore-backup")? {
                    return Ok(WorkflowOutcome::Cancelled);
                }
                self.destroy(&DestroyTarget::all(&primary))?;
            }

            let request = TransferRequest::full(&reference.volume, &primary, snapshot);
            self.transfer(&request)?;
            self.reporter()
                .restore_finished(&reference.to_string(), &primary);
            Ok(WorkflowOutcome::Completed)
        })
    }

    /// Rolls the primary back to local snapshot `name`, destroying every
    /// later snapshot and all data written since.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::SnapshotNotFound`] if the primary has no
    /// snapshot called `name`.
    pub fn restore_to_snapshot(
        &self,
        name: &str,
        confirmer: &dyn Confirmer,
    ) -> BackupResult<WorkflowOutcome> {
        let primary = self.config().primary.clone();
        self.run(|| {
            if !Catalog::load(self.store(), &primary)?.contains_name(name) {
                return Err(BackupError::SnapshotNotFound {
                    volume: primary.clone(),
                    name: name.to_string(),
                });
            }

            let prompt = format!(
                "THIS WILL ROLLBACK ALL DATA ON THE POOL \"{primary}\" TO THE SNAPSHOT \"{primary}@{name}\"! Are you sure? (y/N) "
            );
            if !self.confirm(confirmer, &prompt, "restore-snapshot")? {
                return Ok(WorkflowOutcome::Cancelled);
            }

            warn!(volume = %primary, snapshot = name, "rolling back");
            self.store().rollback(&primary, name, true)?;
            self.reporter()
                .restore_finished(&format!("{primary}@{name}"), &primary);
            Ok(WorkflowOutcome::Completed)
        })
    }

    /// Deletes snapshot `name` from the volumes selected by `scope`.
    ///
    /// With [`RemoveScope::Everywhere`], volumes lacking the name are
    /// skipped. Deletions run primary first and stop at the first failure;
    /// deletions already made stand.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::SnapshotNotFound`] if no selected volume holds
    /// the name.
    pub fn remove_snapshot(
        &self,
        name: &str,
        scope: RemoveScope,
        confirmer: &dyn Confirmer,
    ) -> BackupResult<WorkflowOutcome> {
        let config = self.config();
        let volumes: Vec<&str> = match scope {
            RemoveScope::Primary => vec![config.primary.as_str()],
            RemoveScope::Backup => vec![config.backup.as_str()],
            RemoveScope::Everywhere => vec![config.primary.as_str(), config.backup.as_str()],
        };

        self.run(|| {
            let mut targets = Vec::new();
            for volume in &volumes {
                if Catalog::load(self.store(), volume)?.contains_name(name) {
                    targets.push(DestroyTarget::snapshot(*volume, name));
                } else {
                    debug!(volume, name, "snapshot absent, skipping");
                }
            }

            let missing = match scope {
                RemoveScope::Everywhere => targets.is_empty(),
                RemoveScope::Primary | RemoveScope::Backup => targets.len() < volumes.len(),
            };
            if missing {
                return Err(BackupError::SnapshotNotFound {
                    volume: volumes.join(", "),
                    name: name.to_string(),
                });
            }

            let listed = targets
                .iter()
                .map(|t| format!("\"{t}\""))
                .collect::<Vec<_>>()
                .join(", ");
            let prompt = format!("THIS WILL DESTROY THE SNAPSHOT {listed}! Are you sure? (y/N) ");
            if !self.confirm(confirmer, &prompt, "remove")? {
                return Ok(WorkflowOutcome::Cancelled);
            }

            for target in &targets {
                self.destroy(target)?;
            }
            Ok(WorkflowOutcome::Completed)
        })
    }

    fn confirm(
        &self,
        confirmer: &dyn Confirmer,
        prompt: &str,
        operation: &str,
    ) -> BackupResult<bool> {
        let answer = confirmer.ask(prompt).map_err(BackupError::Confirmation)?;
        if is_affirmative(&answer) {
            return Ok(true);
        }
        self.reporter().cancelled(operation);
        Ok(false)
    }

    fn destroy(&self, target: &DestroyTarget) -> BackupResult<()> {
        warn!(target = %target, "destroying");
        self.store().destroy(target)?;
        self.reporter().snapshot_destroyed(&target.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackupConfig;
    use crate::report::{AssumeYes, ScriptedConfirmer};
    use zbackup_store::{InMemoryStore, StoreCall};

    fn setup() -> (InMemoryStore, BackupEngine<InMemoryStore>) {
        let store = InMemoryStore::with_volumes(["tank", "backup"]);
        let engine = BackupEngine::new(BackupConfig::new("tank", "backup"), store.clone()).unwrap();
        (store, engine)
    }

    #[test]
    fn restore_from_primary_is_invalid_target() {
        let (store, engine) = setup();
        store.seed("tank", "s1", 100);
        let confirmer = ScriptedConfirmer::new("y");

        let err = engine
            .restore_from_backup(&SnapshotRef::parse("tank@s1").unwrap(), &confirmer)
            .unwrap_err();

        assert!(matches!(err, BackupError::InvalidTarget { .. }));
        assert!(confirmer.prompts().is_empty());
        assert!(store.calls().is_empty());
    }

    #[test]
    fn restore_into_empty_primary_skips_prompt() {
        let (store, engine) = setup();
        store.seed("backup", "s1", 100);
        let confirmer = ScriptedConfirmer::new("n");

        let outcome = engine
            .restore_from_backup(&SnapshotRef::parse("backup@s1").unwrap(), &confirmer)
            .unwrap();

        assert_eq!(outcome, WorkflowOutcome::Completed);
        assert!(confirmer.prompts().is_empty());
        assert_eq!(store.snapshot_names("tank"), vec!["s1"]);
    }

    #[test]
    fn restore_missing_snapshot_is_not_found() {
        let (store, engine) = setup();
        store.seed("tank", "s1", 100);

        let err = engine
            .restore_from_backup(&SnapshotRef::parse("backup@s9").unwrap(), &AssumeYes)
            .unwrap_err();

        assert!(matches!(err, BackupError::SnapshotNotFound { .. }));
        assert_eq!(store.destroy_count(), 0);
    }

    #[test]
    fn rollback_prompt_names_pool_and_snapshot() {
        let (store, engine) = setup();
        store.seed("tank", "s1", 100);
        store.seed("tank", "s2", 200);
        let confirmer = ScriptedConfirmer::new("yes");

        let outcome = engine.restore_to_snapshot("s1", &confirmer).unwrap();

        assert_eq!(outcome, WorkflowOutcome::Completed);
        assert_eq!(
            confirmer.prompts(),
            vec!["THIS WILL ROLLBACK ALL DATA ON THE POOL \"tank\" TO THE SNAPSHOT \"tank@s1\"! Are you sure? (y/N) "]
        );
        assert_eq!(store.snapshot_names("tank"), vec!["s1"]);
    }

    #[test]
    fn remove_everywhere_skips_volumes_without_the_name() {
        let (store, engine) = setup();
        store.seed("tank", "s1", 100);

        let outcome = engine
            .remove_snapshot("s1", RemoveScope::Everywhere, &AssumeYes)
            .unwrap();

        assert_eq!(outcome, WorkflowOutcome::Completed);
        assert_eq!(
            store
                .calls()
                .into_iter()
                .filter(|c| matches!(c, StoreCall::Destroy(_)))
                .collect::<Vec<_>>(),
            vec![StoreCall::Destroy("tank@s1".into())]
        );
    }

    #[test]
    fn remove_strict_scope_needs_the_name() {
        let (store, engine) = setup();
        store.seed("tank", "s1", 100);

        let err = engine
            .remove_snapshot("s1", RemoveScope::Backup, &AssumeYes)
            .unwrap_err();

        assert!(matches!(err, BackupError::SnapshotNotFound { volume, .. } if volume == "backup"));
        assert_eq!(store.snapshot_names("tank"), vec!["s1"]);
    }

    #[test]
    fn remove_declined_changes_nothing() {
        let (store, engine) = setup();
        store.seed("tank", "s1", 100);
        store.seed("backup", "s1", 100);
        let confirmer = ScriptedConfirmer::new("");

        let outcome = engine
            .remove_snapshot("s1", RemoveScope::Everywhere, &confirmer)
            .unwrap();

        assert!(outcome.is_cancelled());
        assert_eq!(store.destroy_count(), 0);
        assert!(confirmer.prompts()[0].contains("\"tank@s1\", \"backup@s1\""));
    }
}
