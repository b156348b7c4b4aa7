//! Core type definitions.

use std::fmt;

/// Unique identifier for a transaction.
///
/// Allocated from a counter in the shared control region, so identifiers are
/// unique across every process mapping the same journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{:016X}", self.0)
    }
}

/// Journal sequence number.
///
/// Sequence numbers are the values handed out by the leading counter. The
/// first reserved sequence is 1; zero means "nothing applied yet".
///
/// The journal stops reserving at [`SequenceNumber::LAST`] rather than
/// wrapping, so stored sequences are totally ordered as plain integers and
/// `next` never overflows for one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// The sequence number before any entry.
    pub const ZERO: Self = Self(0);

    /// The last sequence the journal reserves.
    pub const LAST: Self = Self(u64::MAX - 1);

    /// Creates a new sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the ring slot this sequence occupies.
    #[must_use]
    pub const fn slot(self, capacity: u64) -> u64 {
        self.0 % capacity
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}
