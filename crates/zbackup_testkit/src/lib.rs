//! # zbackup Testkit
//!
//! Test utilities for zbackup.
//!
//! This crate provides:
//! - Primary/backup fixtures on an in-memory snapshot store
//! - A reporter that records engine events
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use zbackup_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_pair() {
//!     with_pair(|pair| {
//!         pair.seed_primary(&[("s1", 100)]);
//!         pair.engine.sync().unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
