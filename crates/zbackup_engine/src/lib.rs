//! # zbackup Engine
//!
//! Snapshot reconciliation and incremental transfer engine for zbackup.
//!
//! This crate provides:
//! - Snapshot catalogs built from raw volume listings
//! - Reconciliation of primary and backup histories (checkpoint, pending)
//! - A chunked transfer pipeline between a snapshot producer and consumer
//! - The sync loop and "create then sync" backup operation
//! - Confirmation-gated restore, rollback and removal workflows
//!
//! ## Architecture
//!
//! Replication is **one-way**, primary to backup, one snapshot per round:
//! 1. Load both catalogs through the [`zbackup_store::SnapshotStore`]
//! 2. Find the checkpoint (latest snapshot present on both sides)
//! 3. Pick the earliest primary snapshot after it that the backup lacks
//! 4. Transfer it, as a delta against the checkpoint when possible
//! 5. Repeat until nothing is pending
//!
//! ## Key Invariants
//!
//! - Snapshots are equal only if both name and creation time match
//! - At most one transfer is in flight
//! - A snapshot only counts as replicated once the consumer confirms it
//! - Every chunk read is written in full, or the transfer fails
//! - Destructive workflows change nothing unless confirmed

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod config;
mod engine;
mod error;
mod reconcile;
mod report;
mod snapshot;
mod transfer;
mod workflow;

pub use catalog::Catalog;
pub use config::{BackupConfig, MAX_CHUNK_SIZE};
pub use engine::{
    BackupEngine, CreateBackupOutcome, EngineState, EngineStats, SnapshotRow, SyncOutcome,
    TransferRecord,
};
pub use error::{BackupError, BackupResult, TransferError};
pub use reconcile::{checkpoint, pending, reconcile, ReconcilePlan, TransferMode};
pub use report::{
    is_affirmative, AssumeYes, Confirmer, NoopReporter, Reporter, ScriptedConfirmer,
    TracingReporter,
};
pub use snapshot::{validate_snapshot_name, Snapshot, SnapshotRef};
pub use transfer::{TransferPipeline, TransferRequest, TransferStats, DEFAULT_CHUNK_SIZE};
pub use workflow::{RemoveScope, WorkflowOutcome};
