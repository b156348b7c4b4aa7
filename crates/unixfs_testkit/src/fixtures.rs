//! Test fixtures and driver helpers.
//!
//! Provides convenience functions for setting up test stores and common
//! test scenarios.

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use unixfs_core::{
    Config, ControlRegion, DataStore, PersistenceDriver, SequenceNumber, TransactionJournal,
};
use unixfs_storage::InMemoryBackend;

/// Configuration with small slots and no per-commit flush, for fast tests.
#[must_use]
pub fn test_config() -> Config {
    Config::new()
        .capacity(64)
        .slot_size(512)
        .sync_on_commit(false)
}

/// A file-backed test store with automatic cleanup.
pub struct TestStore {
    /// The driver.
    pub driver: PersistenceDriver,
    config: Config,
    temp_dir: TempDir,
}

impl TestStore {
    /// Creates a store in a fresh temporary directory.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Creates a store with the given configuration.
    pub fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let driver = PersistenceDriver::open(temp_dir.path(), config.clone())
            .expect("Failed to open store");
        Self {
            driver,
            config,
            temp_dir,
        }
    }

    /// Closes the driver and opens the directory again, running recovery.
    pub fn reopen(self) -> Self {
        let Self {
            driver,
            config,
            temp_dir,
        } = self;
        drop(driver);
        let driver = PersistenceDriver::open(temp_dir.path(), config.clone())
            .expect("Failed to reopen store");
        Self {
            driver,
            config,
            temp_dir,
        }
    }

    /// Root directory of the store.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Commits one transaction putting each pair.
    pub fn commit_puts(&self, pairs: &[(&[u8], &[u8])]) -> SequenceNumber {
        let mut txn = self.driver.begin();
        for (key, value) in pairs {
            self.driver
                .stage(&mut txn, key, value)
                .expect("Failed to stage");
        }
        self.driver.commit(&mut txn).expect("Failed to commit")
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = PersistenceDriver;

    fn deref(&self) -> &Self::Target {
        &self.driver
    }
}

/// An in-memory driver whose journal bytes stay reachable for corruption.
pub struct MemoryStore {
    /// The driver.
    pub driver: PersistenceDriver,
    /// Backing bytes of the journal slot file.
    pub journal_backend: Arc<InMemoryBackend>,
}

impl MemoryStore {
    /// Creates an in-memory store.
    pub fn new(config: Config) -> Self {
        let journal_backend = Arc::new(InMemoryBackend::new());
        let store = DataStore::open(Box::new(InMemoryBackend::new()), false)
            .expect("Failed to open DataStore");
        let region = ControlRegion::anonymous().expect("Failed to map control region");
        let journal =
            TransactionJournal::with_backend(journal_backend.clone(), Arc::new(region), &config)
                .expect("Failed to open journal");
        let driver =
            PersistenceDriver::new(store, journal, config).expect("Failed to assemble driver");
        Self {
            driver,
            journal_backend,
        }
    }

    /// Flips a byte inside the slot of `sequence`.
    pub fn corrupt_slot(&self, sequence: SequenceNumber, offset_in_slot: u64) {
        let base = self.driver.journal().slot_offset(sequence);
        self.journal_backend.corrupt_byte(base + offset_in_slot);
    }
}

impl std::ops::Deref for MemoryStore {
    type Target = PersistenceDriver;

    fn deref(&self) -> &Self::Target {
        &self.driver
    }
}

/// Runs a test with a temporary file-backed store.
///
/// # Example
///
/// ```rust,ignore
/// use unixfs_testkit::with_temp_store;
///
/// #[test]
/// fn my_test() {
///     with_temp_store(|driver| {
///         let txn = driver.begin();
///         // ... test operations
///     });
/// }
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&PersistenceDriver) -> R,
{
    let store = TestStore::new();
    f(&store.driver)
}

/// Runs a test with an in-memory store.
pub fn with_memory_store<F, R>(f: F) -> R
where
    F: FnOnce(&MemoryStore) -> R,
{
    let store = MemoryStore::new(test_config());
    f(&store)
}
