//! Error types for the backup engine.

use std::io;
use thiserror::Error;
use zbackup_store::StoreError;

/// Result type for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;

/// Errors that can occur during backup operations.
#[derive(Error, Debug)]
pub enum BackupError {
    /// A snapshot listing failed or could not be parsed.
    #[error("snapshot catalog for {volume} unavailable: {reason}")]
    CatalogUnavailable {
        /// Volume whose listing failed.
        volume: String,
        /// What went wrong.
        reason: String,
    },

    /// A snapshot with the requested name already exists.
    #[error("snapshot {volume}@{name} already exists")]
    NameCollision {
        /// Volume holding the existing snapshot.
        volume: String,
        /// The colliding name.
        name: String,
    },

    /// A restore was requested from the primary volume itself.
    #[error("cannot restore {volume} from itself; use restore-snapshot to roll back to a local snapshot")]
    InvalidTarget {
        /// The primary volume.
        volume: String,
    },

    /// The named snapshot does not exist.
    #[error("snapshot {volume}@{name} does not exist")]
    SnapshotNotFound {
        /// Volume that was searched.
        volume: String,
        /// Missing snapshot name.
        name: String,
    },

    /// A `volume@snapshot` reference could not be parsed.
    #[error("invalid snapshot reference {0:?}, expected volume@snapshot")]
    InvalidReference(String),

    /// A snapshot name is not acceptable for creation.
    #[error("invalid snapshot name {0:?}")]
    InvalidSnapshotName(String),

    /// Relaying a snapshot from producer to consumer failed.
    #[error("transfer of snapshot {snapshot} failed: {error}")]
    TransferFailure {
        /// Snapshot being transferred.
        snapshot: String,
        /// What broke.
        error: TransferError,
    },

    /// A transfer reported success but the backup still lacks the snapshot.
    #[error("snapshot {snapshot} still pending after a successful transfer")]
    ReplicationStalled {
        /// Snapshot that failed to appear on the backup.
        snapshot: String,
    },

    /// Configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Another operation is already running on this engine.
    #[error("engine busy: {state}")]
    Busy {
        /// State the engine was in.
        state: String,
    },

    /// Reading the confirmation answer failed.
    #[error("confirmation failed: {0}")]
    Confirmation(io::Error),

    /// Snapshot store error outside a transfer.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl BackupError {
    /// Returns true if the error was caused by the request rather than by
    /// the volumes or the store.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            BackupError::NameCollision { .. }
                | BackupError::InvalidTarget { .. }
                | BackupError::SnapshotNotFound { .. }
                | BackupError::InvalidReference(_)
                | BackupError::InvalidSnapshotName(_)
                | BackupError::InvalidConfig(_)
        )
    }
}

/// Errors raised by a single transfer attempt.
///
/// Any of these aborts the attempt. Nothing about the backup catalog may be
/// assumed afterwards; callers reconcile again before retrying.
#[derive(Error, Debug)]
pub enum TransferError {
    /// The producer could not be started.
    #[error("failed to start producer: {0}")]
    ProducerStart(StoreError),

    /// The consumer could not be started.
    #[error("failed to start consumer: {0}")]
    ConsumerStart(StoreError),

    /// Reading from the producer failed.
    #[error("read error: {0}")]
    Read(io::Error),

    /// Writing to the consumer failed.
    #[error("write error: {0}")]
    Write(io::Error),

    /// The consumer accepted fewer bytes than were read.
    #[error("short write: read {read} bytes, wrote {written} bytes")]
    ShortWrite {
        /// Bytes read from the producer.
        read: usize,
        /// Bytes the consumer accepted.
        written: usize,
    },

    /// The consumer reported failure on completion.
    #[error("consumer failed: {0}")]
    Consumer(StoreError),
}
