//! # UnixFS Storage
//!
//! Byte-store backends underneath the UnixFS journal engine.
//!
//! Backends are **opaque byte stores**: they know nothing about journal
//! slots, counters or DataStore records. The engine owns every file format.
//!
//! ## Design Principles
//!
//! - Positional reads and writes (`read_at`, `write_at`) so that writers
//!   filling distinct journal slots never contend on a shared cursor
//! - Appends for log-structured files such as the DataStore
//! - Every method takes `&self`; backends are `Send + Sync` and shareable
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//! - [`FileBackend`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use unixfs_storage::{StorageBackend, InMemoryBackend};
//!
//! let backend = InMemoryBackend::new();
//! backend.preallocate(16).unwrap();
//! backend.write_at(4, b"slot").unwrap();
//! assert_eq!(backend.read_at(4, 4).unwrap(), b"slot");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod platform;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
