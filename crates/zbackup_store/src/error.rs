//! Error types for snapshot store operations.

use std::io;
use thiserror::Error;

/// Result type for snapshot store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to a snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A volume-management command exited unsuccessfully.
    #[error("command `{command}` failed: {stderr}")]
    CommandFailed {
        /// The command line that was run.
        command: String,
        /// What the command printed on stderr.
        stderr: String,
    },

    /// A snapshot listing line could not be split into its fields.
    #[error("malformed listing for volume {volume}: {line:?}")]
    MalformedListing {
        /// The volume being listed.
        volume: String,
        /// The offending line.
        line: String,
    },

    /// The snapshot already exists.
    #[error("snapshot already exists: {0}")]
    AlreadyExists(String),

    /// The snapshot does not exist.
    #[error("snapshot not found: {0}")]
    NotFound(String),

    /// The volume does not exist.
    #[error("unknown volume: {0}")]
    UnknownVolume(String),

    /// The consumer refused the transfer stream.
    #[error("stream rejected: {0}")]
    StreamRejected(String),
}
