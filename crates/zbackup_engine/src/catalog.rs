//! Ordered view of a volume's snapshot history.

use crate::error::{BackupError, BackupResult};
use crate::snapshot::Snapshot;
use tracing::debug;
use zbackup_store::{ListingEntry, SnapshotStore};

/// The snapshot history of one volume.
///
/// Snapshots keep the order the volume-management subsystem reported them
/// in, which is creation order. Duplicate values are dropped, first seen
/// wins.
///
/// # Invariants
///
/// - A catalog is either fully parsed or not built at all
/// - No two entries are equal by value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    volume: String,
    snapshots: Vec<Snapshot>,
}

impl Catalog {
    /// Lists `volume` through the store and parses the result.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::CatalogUnavailable`] if the listing fails or
    /// any creation time is not a whole number of seconds.
    pub fn load<S: SnapshotStore + ?Sized>(store: &S, volume: &str) -> BackupResult<Self> {
        let entries = store
            .list(volume)
            .map_err(|e| BackupError::CatalogUnavailable {
                volume: volume.to_string(),
                reason: e.to_string(),
            })?;
        let catalog = Self::from_listing(volume, entries)?;
        debug!(volume, snapshots = catalog.len(), "loaded snapshot catalog");
        Ok(catalog)
    }

    /// Builds a catalog from raw listing entries.
    ///
    /// The `volume@` prefix is stripped from identifiers that carry it.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::CatalogUnavailable`] if any creation time fails
    /// to parse. Partially parsed listings are never returned.
    pub fn from_listing(volume: &str, entries: Vec<ListingEntry>) -> BackupResult<Self> {
        let prefix = format!("{volume}@");
        let snapshots = entries
            .into_iter()
            .map(|entry| -> BackupResult<Snapshot> {
                let created_at = entry.creation.trim().parse::<i64>().map_err(|_| {
                    BackupError::CatalogUnavailable {
                        volume: volume.to_string(),
                        reason: format!(
                            "malformed creation time {:?} for {}",
                            entry.creation, entry.identifier
                        ),
                    }
                })?;
                let name = entry
                    .identifier
                    .strip_prefix(&prefix)
                    .unwrap_or(&entry.identifier);
                Ok(Snapshot::new(name, created_at))
            })
            .collect::<BackupResult<Vec<_>>>()?;

        Ok(Self::from_snapshots(volume, snapshots))
    }

    /// Builds a catalog from snapshot values, dropping repeated values.
    pub fn from_snapshots(volume: impl Into<String>, snapshots: Vec<Snapshot>) -> Self {
        let mut unique: Vec<Snapshot> = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            if !unique.contains(&snapshot) {
                unique.push(snapshot);
            }
        }
        Self {
            volume: volume.into(),
            snapshots: unique,
        }
    }

    /// Volume this catalog describes.
    pub fn volume(&self) -> &str {
        &self.volume
    }

    /// Snapshots in creation order.
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Iterates snapshots in creation order.
    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.snapshots.iter()
    }

    /// Number of snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Returns true if the volume has no snapshots.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Returns true if a snapshot equal by name and creation time is present.
    pub fn contains(&self, snapshot: &Snapshot) -> bool {
        self.snapshots.contains(snapshot)
    }

    /// Returns true if any snapshot carries `name`, whatever its creation time.
    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name(name).is_some()
    }

    /// Returns the first snapshot named `name`.
    pub fn by_name(&self, name: &str) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.name() == name)
    }

    /// Union of two catalogs for display: this catalog's snapshots first, then
    /// the other's that are not already present by value.
    ///
    /// Reconciliation never uses the merged list.
    pub fn merge(&self, other: &Catalog) -> Vec<Snapshot> {
        let mut merged = self.snapshots.clone();
        for snapshot in &other.snapshots {
            if !merged.contains(snapshot) {
                merged.push(snapshot.clone());
            }
        }
        merged
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a Snapshot;
    type IntoIter = std::slice::Iter<'a, Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
