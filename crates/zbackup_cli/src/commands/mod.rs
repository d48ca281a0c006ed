//! CLI command implementations.

pub mod create;
pub mod list;
pub mod remove;
pub mod restore;
pub mod sync;
