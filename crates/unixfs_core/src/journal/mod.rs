//! Fixed-capacity, checksum-verified transaction journal.
//!
//! Entries live in a preallocated slot file; the counters that order them
//! live in a separate memory-mapped control file (see [`crate::counter`]).

mod entry;
mod replay;
mod ring;

pub use entry::{
    JournalEntry, JournalHeader, JOURNAL_HEADER_SIZE, JOURNAL_MAGIC, JOURNAL_VERSION,
    SLOT_HEADER_SIZE,
};
pub use replay::JournalReplay;
pub use ring::TransactionJournal;
