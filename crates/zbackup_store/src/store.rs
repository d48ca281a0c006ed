//! Snapshot store trait definition.

use crate::error::StoreResult;
use std::fmt;
use std::io::{Read, Write};

/// One raw line of a snapshot listing.
///
/// Fields are kept exactly as the volume-management subsystem reported them.
/// Interpreting the creation field is left to the caller so that malformed
/// data can be rejected as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// Fully qualified identifier, usually `volume@name`.
    pub identifier: String,
    /// Creation time in epoch seconds, unparsed.
    pub creation: String,
}

impl ListingEntry {
    /// Creates a listing entry.
    pub fn new(identifier: impl Into<String>, creation: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            creation: creation.into(),
        }
    }
}

/// What a destroy call removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestroyTarget {
    /// A single named snapshot.
    Snapshot {
        /// Volume holding the snapshot.
        volume: String,
        /// Snapshot name without the volume prefix.
        name: String,
    },
    /// Every snapshot of the volume (`volume@%`).
    AllSnapshots {
        /// Volume to clear.
        volume: String,
    },
}

impl DestroyTarget {
    /// Targets a single snapshot.
    pub fn snapshot(volume: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Snapshot {
            volume: volume.into(),
            name: name.into(),
        }
    }

    /// Targets every snapshot of a volume.
    pub fn all(volume: impl Into<String>) -> Self {
        Self::AllSnapshots {
            volume: volume.into(),
        }
    }

    /// Returns the volume this target belongs to.
    pub fn volume(&self) -> &str {
        match self {
            DestroyTarget::Snapshot { volume, .. } | DestroyTarget::AllSnapshots { volume } => {
                volume
            }
        }
    }
}

impl fmt::Display for DestroyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestroyTarget::Snapshot { volume, name } => write!(f, "{volume}@{name}"),
            DestroyTarget::AllSnapshots { volume } => write!(f, "{volume}@%"),
        }
    }
}

/// Parameters of a send call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    /// Volume the snapshot lives on.
    pub volume: String,
    /// Snapshot whose state is sent.
    pub to: String,
    /// Base snapshot for an incremental send. `None` sends the complete state.
    pub from: Option<String>,
}

impl SendRequest {
    /// A complete-state send of `to`.
    pub fn full(volume: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            volume: volume.into(),
            to: to.into(),
            from: None,
        }
    }

    /// An incremental send covering everything after `from` up to `to`.
    pub fn incremental(
        volume: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            volume: volume.into(),
            to: to.into(),
            from: Some(from.into()),
        }
    }

    /// Returns true if this is an incremental send.
    pub fn is_incremental(&self) -> bool {
        self.from.is_some()
    }
}

impl fmt::Display for SendRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.from {
            Some(from) => write!(f, "{0}@{from}..{0}@{1}", self.volume, self.to),
            None => write!(f, "{}@{}", self.volume, self.to),
        }
    }
}

/// Byte stream produced by a send.
///
/// A producer that fails after it started must surface as a read error,
/// at the latest when end-of-stream is reached.
pub type SnapshotStream = Box<dyn Read + Send>;

/// Consumer end of a transfer.
///
/// Bytes written are applied to the target volume. The transfer only counts
/// as applied once [`SnapshotSink::finish`] returns `Ok`. Dropping a sink
/// without finishing it abandons the transfer.
pub trait SnapshotSink: Write + Send {
    /// Closes the input and waits for the consumer's completion status.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer rejected the stream or exited
    /// unsuccessfully.
    fn finish(self: Box<Self>) -> StoreResult<()>;
}

/// The volume-management capability the backup engine drives.
///
/// Stores are opaque: the engine never interprets stream bytes, it only relays
/// them from a [`SnapshotStream`] into a [`SnapshotSink`].
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::ZfsStore`] - Drives the `zfs` command
pub trait SnapshotStore: Send + Sync {
    /// Lists the snapshots of `volume` in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing cannot be obtained or split into fields.
    fn list(&self, volume: &str) -> StoreResult<Vec<ListingEntry>>;

    /// Creates snapshot `name` on `volume`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::AlreadyExists`] if the name is taken.
    fn create(&self, volume: &str, name: &str) -> StoreResult<()>;

    /// Destroys one snapshot or all snapshots of a volume.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot does not exist or deletion fails.
    fn destroy(&self, target: &DestroyTarget) -> StoreResult<()>;

    /// Starts a producer serializing the requested snapshot state.
    ///
    /// # Errors
    ///
    /// Returns an error if the producer cannot be started.
    fn send(&self, request: &SendRequest) -> StoreResult<SnapshotStream>;

    /// Starts a consumer applying a stream to `target_volume`, overwriting
    /// any diverging state there.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer cannot be started.
    fn receive(&self, target_volume: &str) -> StoreResult<Box<dyn SnapshotSink>>;

    /// Rolls `volume` back to `snapshot`.
    ///
    /// With `recursive` set, later snapshots are destroyed as part of the
    /// rollback.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot does not exist or the rollback fails.
    fn rollback(&self, volume: &str, snapshot: &str, recursive: bool) -> StoreResult<()>;
}
