//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level positional byte store.
///
/// The journal preallocates its slot file and then rewrites fixed-size
/// regions in place with [`write_at`](Self::write_at); the DataStore uses
/// [`append`](Self::append) as a record log. Both share this trait so the
/// engine can run over files in production and over memory in tests.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `write_at` never grows the store; the target range must already exist
/// - `read_at` returns exactly the bytes last written at that range
/// - `sync` makes all previously written data durable
/// - Concurrent `write_at` calls on disjoint ranges do not interfere
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`ReadPastEnd`](crate::StorageError::ReadPastEnd) if the
    /// range extends beyond the current size, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Overwrites `data.len()` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`WritePastEnd`](crate::StorageError::WritePastEnd) if the
    /// range is not inside the current size, or an I/O error.
    fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Appends data to the end of the storage.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&self, data: &[u8]) -> StorageResult<u64>;

    /// Grows the storage to at least `len` bytes, zero-filling the new range.
    ///
    /// Does nothing if the storage is already that large.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be extended.
    fn preallocate(&self, len: u64) -> StorageResult<()>;

    /// Flushes written data to durable storage.
    ///
    /// File metadata may still be pending; see [`sync`](Self::sync).
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&self) -> StorageResult<()>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Truncates the storage to the given size.
    ///
    /// Used by the DataStore to cut off a torn record tail after a crash.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTruncate`](crate::StorageError::InvalidTruncate) if
    /// `new_size` is greater than the current size, or an I/O error.
    fn truncate(&self, new_size: u64) -> StorageResult<()>;
}
