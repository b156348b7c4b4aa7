//! Error types for the journal engine.

use crate::transaction::TransactionState;
use crate::types::TransactionId;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in journal, DataStore and driver operations.
///
/// CAS contention never shows up here; it is retried inside the counters.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] unixfs_storage::StorageError),

    /// I/O error, including failures to map the control region.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Every slot of the ring is reserved but not yet published.
    #[error("journal full: {leading} reserved, {trailing} published, capacity {capacity}")]
    JournalFull {
        /// Ring capacity in slots.
        capacity: u64,
        /// Leading counter observed when the reservation was refused.
        leading: u64,
        /// Trailing counter observed when the reservation was refused.
        trailing: u64,
    },

    /// A journal slot failed integrity verification.
    #[error("corrupt journal entry at sequence {sequence}: {reason}")]
    CorruptEntry {
        /// Sequence number that was being read.
        sequence: u64,
        /// What failed to verify.
        reason: String,
    },

    /// The requested sequence has not been published yet.
    #[error("journal entry {sequence} not published (trailing watermark {trailing})")]
    EntryNotPublished {
        /// Requested sequence number.
        sequence: u64,
        /// Trailing watermark at the time of the read.
        trailing: u64,
    },

    /// The ring wrapped and the slot now belongs to a later sequence.
    #[error("journal entry {sequence} was overwritten after the ring wrapped (capacity {capacity})")]
    EntryOverwritten {
        /// Requested sequence number.
        sequence: u64,
        /// Ring capacity in slots.
        capacity: u64,
    },

    /// A transaction was used in a state that does not allow the operation.
    #[error("transaction {transaction} is {actual}, expected {expected}")]
    InvalidState {
        /// The transaction.
        transaction: TransactionId,
        /// States in which the operation is allowed.
        expected: &'static str,
        /// State the transaction was actually in.
        actual: TransactionState,
    },

    /// The serialized mutation set does not fit in a journal slot.
    #[error("payload of {size} bytes exceeds the slot payload limit of {max} bytes")]
    PayloadTooLarge {
        /// Encoded payload size.
        size: usize,
        /// Largest payload a slot can hold.
        max: usize,
    },

    /// A journal or control file has an unexpected layout.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// A checksummed payload could not be decoded as a mutation set.
    #[error("invalid mutation payload: {message}")]
    InvalidPayload {
        /// Description of the decoding failure.
        message: String,
    },

    /// The DataStore record log is corrupted.
    #[error("DataStore corruption: {message}")]
    DataStoreCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// The mapped counters hold values that violate their invariants.
    #[error("counter corruption: {message}")]
    CounterCorrupted {
        /// Description of the violated invariant.
        message: String,
    },

    /// Another process owns the storage directory.
    #[error("storage directory locked: another process has exclusive access")]
    DirectoryLocked,

    /// Configuration rejected by validation.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a corrupt entry error.
    pub fn corrupt_entry(sequence: u64, reason: impl Into<String>) -> Self {
        Self::CorruptEntry {
            sequence,
            reason: reason.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    /// Creates a DataStore corruption error.
    pub fn datastore_corruption(message: impl Into<String>) -> Self {
        Self::DataStoreCorruption {
            message: message.into(),
        }
    }

    /// Creates a counter corruption error.
    pub fn counter_corrupted(message: impl Into<String>) -> Self {
        Self::CounterCorrupted {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if retrying the same operation later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::JournalFull { .. })
    }

    /// Returns true for integrity failures of journal data.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::CorruptEntry { .. } | Self::InvalidPayload { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_full_is_retryable() {
        let err = CoreError::JournalFull {
            capacity: 4,
            leading: 8,
            trailing: 4,
        };
        assert!(err.is_retryable());
        assert!(!CoreError::corrupt_entry(1, "bad").is_retryable());
    }

    #[test]
    fn invalid_state_display() {
        let err = CoreError::InvalidState {
            transaction: TransactionId::new(1),
            expected: "OPEN",
            actual: TransactionState::Committed,
        };
        let display = err.to_string();
        assert!(display.contains("COMMITTED"));
        assert!(display.contains("OPEN"));
    }

    #[test]
    fn storage_error_converts() {
        let err: CoreError = unixfs_storage::StorageError::InvalidTruncate {
            new_size: 2,
            size: 1,
        }
        .into();
        assert!(matches!(err, CoreError::Storage(_)));
    }
}
