//! # zbackup Store
//!
//! Snapshot store capability and implementations for zbackup.
//!
//! This crate provides the volume-management boundary of zbackup. Stores
//! list, create, destroy and roll back snapshots, and hand out the two ends
//! of a transfer: a producer stream and a consumer sink. Transfer streams
//! are **opaque bytes** - the engine relays them without interpreting them.
//!
//! ## Design Principles
//!
//! - Stores report raw listings; interpreting them is the engine's job
//! - A transfer is applied only when its sink finishes successfully
//! - Abandoned producers and consumers are killed, never left running
//! - Must be `Send + Sync` so one store can serve the whole engine
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and dry runs
//! - [`ZfsStore`] - Drives the `zfs` command-line tool
//!
//! ## Example
//!
//! ```rust
//! use zbackup_store::{InMemoryStore, SnapshotStore};
//!
//! let store = InMemoryStore::with_volumes(["tank"]);
//! store.create("tank", "daily").unwrap();
//! assert_eq!(store.list("tank").unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod store;
mod zfs;

pub use error::{StoreError, StoreResult};
pub use memory::{Fault, InMemoryStore, StoreCall, StoredSnapshot};
pub use store::{
    DestroyTarget, ListingEntry, SendRequest, SnapshotSink, SnapshotStore, SnapshotStream,
};
pub use zfs::ZfsStore;
