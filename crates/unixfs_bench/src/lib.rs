//! Benchmark utilities.

use rand::Rng;
use std::sync::Arc;
use unixfs_core::{Config, ControlRegion, DataStore, PersistenceDriver, TransactionJournal};
use unixfs_storage::InMemoryBackend;

/// Generate random bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` key/value pairs with values of `value_size` bytes.
pub fn generate_pairs(count: usize, value_size: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..count as u64)
        .map(|i| (i.to_be_bytes().to_vec(), random_data(value_size)))
        .collect()
}

/// Journal over memory backends and an anonymous control region.
pub fn memory_journal(config: &Config) -> TransactionJournal {
    TransactionJournal::with_backend(
        Arc::new(InMemoryBackend::new()),
        Arc::new(ControlRegion::anonymous().expect("Failed to map control region")),
        config,
    )
    .expect("Failed to open journal")
}

/// Driver over memory backends.
pub fn memory_driver(config: Config) -> PersistenceDriver {
    let store =
        DataStore::open(Box::new(InMemoryBackend::new()), false).expect("Failed to open DataStore");
    let journal = memory_journal(&config);
    PersistenceDriver::new(store, journal, config).expect("Failed to assemble driver")
}
