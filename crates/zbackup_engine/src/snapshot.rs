//! Snapshot values and references.

use crate::error::{BackupError, BackupResult};
use std::fmt;

/// An immutable point-in-time state of a volume.
///
/// Two snapshots are equal only when both name and creation time match. A
/// snapshot deleted and recreated under the same name is a different
/// snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Snapshot {
    name: String,
    created_at: i64,
}

impl Snapshot {
    /// Creates a snapshot value.
    pub fn new(name: impl Into<String>, created_at: i64) -> Self {
        Self {
            name: name.into(),
            created_at,
        }
    }

    /// Name without the volume prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creation time in epoch seconds.
    pub fn created_at(&self) -> i64 {
        self.created_at
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.created_at)
    }
}

/// A fully qualified `volume@snapshot` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRef {
    /// Volume part.
    pub volume: String,
    /// Snapshot name part.
    pub name: String,
}

impl SnapshotRef {
    /// Parses `volume@snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::InvalidReference`] if the separator is missing or
    /// either side is empty.
    pub fn parse(reference: &str) -> BackupResult<Self> {
        match reference.split_once('@') {
            Some((volume, name)) if !volume.is_empty() && !name.is_empty() => Ok(Self {
                volume: volume.to_string(),
                name: name.to_string(),
            }),
            _ => Err(BackupError::InvalidReference(reference.to_string())),
        }
    }
}

impl fmt::Display for SnapshotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.volume, self.name)
    }
}

/// Checks that `name` can be used for a new snapshot.
///
/// # Errors
///
/// Returns [`BackupError::InvalidSnapshotName`] for empty names and names
/// containing `@`, `/`, `%` or whitespace.
pub fn validate_snapshot_name(name: &str) -> BackupResult<()> {
    let forbidden = |c: char| c == '@' || c == '/' || c == '%' || c.is_whitespace();
    if name.is_empty() || name.contains(forbidden) {
        return Err(BackupError::InvalidSnapshotName(name.to_string()));
    }
    Ok(())
}
