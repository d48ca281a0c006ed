//! Configuration for the backup engine.

use crate::error::{BackupError, BackupResult};
use crate::transfer::DEFAULT_CHUNK_SIZE;
use serde::{Deserialize, Serialize};

/// Largest accepted relay buffer (1 GiB).
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024 * 1024;

/// Configuration for backup operations.
///
/// Deserializes from the JSON config file shape:
///
/// ```json
/// { "zfs_pool": "tank", "zfs_backup_pool": "backup/tank" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Primary volume (source of truth).
    #[serde(rename = "zfs_pool", alias = "primary")]
    pub primary: String,
    /// Backup volume (replication target).
    #[serde(rename = "zfs_backup_pool", alias = "backup")]
    pub backup: String,
    /// Size of the relay buffer used by transfers, in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl BackupConfig {
    /// Creates a new backup configuration.
    pub fn new(primary: impl Into<String>, backup: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            backup: backup.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets the relay buffer size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Checks that the configuration can drive a replication.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::InvalidConfig`] if a volume name is empty, both
    /// volumes are the same, or the chunk size is zero or above
    /// [`MAX_CHUNK_SIZE`].
    pub fn validate(&self) -> BackupResult<()> {
        if self.primary.trim().is_empty() {
            return Err(BackupError::InvalidConfig("primary volume is empty".into()));
        }
        if self.backup.trim().is_empty() {
            return Err(BackupError::InvalidConfig("backup volume is empty".into()));
        }
        if self.primary == self.backup {
            return Err(BackupError::InvalidConfig(format!(
                "primary and backup are both {}",
                self.primary
            )));
        }
        if self.chunk_size == 0 {
            return Err(BackupError::InvalidConfig("chunk size must be positive".into()));
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(BackupError::InvalidConfig(format!(
                "chunk size {} exceeds the {MAX_CHUNK_SIZE} byte limit",
                self.chunk_size
            )));
        }
        Ok(())
    }
}
