//! # UnixFS Testkit
//!
//! Test utilities for the UnixFS journal engine.
//!
//! This crate provides:
//! - Test fixtures for file-backed and in-memory drivers
//! - A fault-injecting storage backend and crash recovery harness
//! - Property-based test generators using proptest
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use unixfs_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     with_temp_store(|driver| {
//!         let mut txn = driver.begin();
//!         driver.stage(&mut txn, b"k", b"v").unwrap();
//!         driver.commit(&mut txn).unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
