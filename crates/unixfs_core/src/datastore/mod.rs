//! Materialized key/value store.
//!
//! The DataStore holds the latest value per key and the sequence of the
//! journal entry that wrote it. Only the persistence driver mutates it.

mod record;
mod store;

pub use record::{DataRecord, Decoded, RecordType, RECORD_MAGIC};
pub use store::{CompactionStats, DataStore};
