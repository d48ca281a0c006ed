//! Reconciliation of primary and backup snapshot histories.
//!
//! Replication proceeds strictly in creation order, one snapshot per round.
//! A delta can only be computed against the most recent common snapshot, so
//! the next snapshot to copy is always the earliest one newer than that
//! common snapshot.
//!
//! Creation times have second resolution, so distinct snapshots can share a
//! timestamp. Ties are broken by catalog order:
//!
//! - [`checkpoint`] prefers the candidate that appears later in the backup catalog
//! - [`pending`] prefers the candidate that appears earlier in the primary catalog

use crate::catalog::Catalog;
use crate::snapshot::Snapshot;

/// How a snapshot travels to the backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferMode {
    /// Complete state, no ancestor needed.
    Full,
    /// Only the difference from `from`, which the backup already holds.
    Delta {
        /// Common ancestor the delta is computed against.
        from: Snapshot,
    },
}

impl TransferMode {
    /// Returns true for [`TransferMode::Delta`].
    pub fn is_delta(&self) -> bool {
        matches!(self, TransferMode::Delta { .. })
    }
}

/// Outcome of comparing two catalogs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Most recent snapshot present on both sides.
    pub checkpoint: Option<Snapshot>,
    /// Earliest primary snapshot the backup still lacks.
    pub pending: Option<Snapshot>,
    /// Whether the backup holds any snapshot at all.
    pub backup_empty: bool,
}

impl ReconcilePlan {
    /// Returns true when nothing is left to copy.
    pub fn is_converged(&self) -> bool {
        self.pending.is_none()
    }

    /// The snapshot to copy next and how to copy it.
    ///
    /// A delta is used whenever a checkpoint exists on a non-empty backup.
    pub fn next_transfer(&self) -> Option<(Snapshot, TransferMode)> {
        let pending = self.pending.clone()?;
        let mode = match &self.checkpoint {
            Some(checkpoint) if !self.backup_empty => TransferMode::Delta {
                from: checkpoint.clone(),
            },
            _ => TransferMode::Full,
        };
        Some((pending, mode))
    }
}

/// Returns the most recently created snapshot present by value in both
/// catalogs, if any.
pub fn checkpoint<'a>(primary: &Catalog, backup: &'a Catalog) -> Option<&'a Snapshot> {
    backup
        .iter()
        .filter(|snapshot| primary.contains(snapshot))
        .fold(None, |best: Option<&Snapshot>, candidate| match best {
            Some(best) if candidate.created_at() < best.created_at() => Some(best),
            _ => Some(candidate),
        })
}

/// Returns the earliest primary snapshot newer than `checkpoint` that the
/// backup does not hold by value.
///
/// Without a checkpoint every primary snapshot is a candidate. `None` means
/// the backup has caught up.
pub fn pending<'a>(
    checkpoint: Option<&Snapshot>,
    primary: &'a Catalog,
    backup: &Catalog,
) -> Option<&'a Snapshot> {
    primary
        .iter()
        .filter(|snapshot| checkpoint.is_none_or(|c| snapshot.created_at() > c.created_at()))
        .filter(|snapshot| !backup.contains(snapshot))
        .fold(None, |best: Option<&Snapshot>, candidate| match best {
            Some(best) if best.created_at() <= candidate.created_at() => Some(best),
            _ => Some(candidate),
        })
}

/// Compares both catalogs and proposes at most one snapshot to copy.
pub fn reconcile(primary: &Catalog, backup: &Catalog) -> ReconcilePlan {
    let checkpoint = checkpoint(primary, backup);
    let pending = pending(checkpoint, primary, backup);
    ReconcilePlan {
        checkpoint: checkpoint.cloned(),
        pending: pending.cloned(),
        backup_empty: backup.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(volume: &str, snapshots: &[(&str, i64)]) -> Catalog {
        Catalog::from_snapshots(
            volume,
            snapshots
                .iter()
                .map(|(name, created)| Snapshot::new(*name, *created))
                .collect(),
        )
    }

    #[test]
    fn first_sync_is_full() {
        let primary = catalog("tank", &[("s1", 100)]);
        let backup = catalog("backup", &[]);

        let plan = reconcile(&primary, &backup);
        assert_eq!(plan.checkpoint, None);
        assert_eq!(plan.pending, Some(Snapshot::new("s1", 100)));
        assert_eq!(
            plan.next_transfer(),
            Some((Snapshot::new("s1", 100), TransferMode::Full))
        );
    }

    #[test]
    fn follow_up_sync_is_delta_from_checkpoint() {
        let primary = catalog("tank", &[("s1", 100), ("s2", 200)]);
        let backup = catalog("backup", &[("s1", 100)]);

        let plan = reconcile(&primary, &backup);
        assert_eq!(plan.checkpoint, Some(Snapshot::new("s1", 100)));
        assert_eq!(
            plan.next_transfer(),
            Some((
                Snapshot::new("s2", 200),
                TransferMode::Delta {
                    from: Snapshot::new("s1", 100)
                }
            ))
        );
    }

    #[test]
    fn identical_histories_converge() {
        let primary = catalog("tank", &[("s1", 100), ("s2", 200)]);
        let backup = catalog("backup", &[("s1", 100), ("s2", 200)]);

        let plan = reconcile(&primary, &backup);
        assert_eq!(plan.checkpoint, Some(Snapshot::new("s2", 200)));
        assert!(plan.is_converged());
        assert_eq!(plan.next_transfer(), None);
    }

    #[test]
    fn recreated_name_is_not_a_checkpoint() {
        let primary = catalog("tank", &[("s1", 100), ("s2", 300)]);
        let backup = catalog("backup", &[("s1", 100), ("s2", 200)]);

        assert_eq!(
            checkpoint(&primary, &backup),
            Some(&Snapshot::new("s1", 100))
        );
        let plan = reconcile(&primary, &backup);
        assert_eq!(plan.pending, Some(Snapshot::new("s2", 300)));
    }

    #[test]
    fn pending_is_earliest_after_checkpoint_not_first_listed() {
        let primary = catalog("tank", &[("s1", 100), ("s4", 400), ("s2", 200), ("s3", 300)]);
        let backup = catalog("backup", &[("s1", 100)]);

        let plan = reconcile(&primary, &backup);
        assert_eq!(plan.pending, Some(Snapshot::new("s2", 200)));
    }

    #[test]
    fn snapshots_older_than_checkpoint_are_never_pending() {
        let primary = catalog("tank", &[("old", 50), ("s1", 100), ("s2", 200)]);
        let backup = catalog("backup", &[("s1", 100), ("s2", 200)]);

        assert_eq!(reconcile(&primary, &backup).pending, None);
    }

    #[test]
    fn checkpoint_tie_prefers_later_backup_entry() {
        let primary = catalog("tank", &[("a", 100), ("b", 100)]);
        let backup = catalog("backup", &[("a", 100), ("b", 100)]);
        assert_eq!(checkpoint(&primary, &backup), Some(&Snapshot::new("b", 100)));

        let backup = catalog("backup", &[("b", 100), ("a", 100)]);
        assert_eq!(checkpoint(&primary, &backup), Some(&Snapshot::new("a", 100)));
    }

    #[test]
    fn pending_tie_prefers_earlier_primary_entry() {
        let primary = catalog("tank", &[("x", 100), ("y", 100)]);
        let backup = catalog("backup", &[]);
        assert_eq!(
            pending(None, &primary, &backup),
            Some(&Snapshot::new("x", 100))
        );
    }

    #[test]
    fn checkpoint_without_overlap_is_none() {
        let primary = catalog("tank", &[("a", 100)]);
        let backup = catalog("backup", &[("z", 100)]);

        let plan = reconcile(&primary, &backup);
        assert_eq!(plan.checkpoint, None);
        assert!(!plan.backup_empty);
        assert_eq!(
            plan.next_transfer(),
            Some((Snapshot::new("a", 100), TransferMode::Full))
        );
    }
}
