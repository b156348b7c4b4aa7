//! # UnixFS Core
//!
//! File-backed transactional storage engine.
//!
//! This crate provides:
//! - Lock-free counters in a memory-mapped control file
//! - A fixed-capacity, checksum-verified transaction journal
//! - A materialized key/value DataStore fed by the journal
//! - A persistence driver with commit, abort and crash recovery
//!
//! ## Example
//!
//! ```rust,no_run
//! use unixfs_core::{Config, PersistenceDriver};
//! use std::path::Path;
//!
//! let driver = PersistenceDriver::open(Path::new("store"), Config::default())?;
//! let mut txn = driver.begin();
//! driver.stage(&mut txn, b"user:1", b"alice")?;
//! let sequence = driver.commit(&mut txn)?;
//! assert_eq!(driver.get(b"user:1"), Some(b"alice".to_vec()));
//! assert_eq!(driver.max_applied_sequence(), sequence);
//! # Ok::<(), unixfs_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod checksum;
pub mod config;
pub mod counter;
pub mod datastore;
pub mod dir;
pub mod error;
pub mod journal;
pub mod transaction;
pub mod types;

pub use checksum::ChecksumAlgorithm;
pub use config::{Config, FullPolicy};
pub use counter::{AtomicSlotCounter, ControlRegion, DualCounter, Snapshot};
pub use datastore::{CompactionStats, DataStore};
pub use dir::{StorageDir, StorageLayout};
pub use error::{CoreError, CoreResult};
pub use journal::{JournalEntry, JournalHeader, JournalReplay, TransactionJournal};
pub use transaction::{
    decode_mutations, encode_mutations, Mutation, PersistenceDriver, RecoveryReport, Transaction,
    TransactionState,
};
pub use types::{SequenceNumber, TransactionId};

/// Crate version, as recorded by the build.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
