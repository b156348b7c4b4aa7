//! CLI command implementations.

pub mod compact;
pub mod dump;
pub mod inspect;
pub mod kv;
pub mod recover;
pub mod verify;

use std::path::Path;
use unixfs_core::{ChecksumAlgorithm, Config, PersistenceDriver, StorageDir};

/// Settings applied when a command creates a new store.
///
/// An existing journal keeps the geometry recorded in its header.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Journal capacity.
    pub capacity: Option<u64>,
    /// Checksum algorithm.
    pub checksum: Option<ChecksumAlgorithm>,
}

impl OpenOptions {
    fn config(&self) -> Config {
        let mut config = Config::default();
        if let Some(capacity) = self.capacity {
            config = config.capacity(capacity);
        }
        if let Some(checksum) = self.checksum {
            config = config.checksum_algorithm(checksum);
        }
        config
    }
}

/// Opens a store for reading and writing, creating it if needed and running
/// recovery.
pub fn open_store(
    path: &Path,
    options: &OpenOptions,
) -> Result<PersistenceDriver, Box<dyn std::error::Error>> {
    Ok(PersistenceDriver::open(path, options.config())?)
}

/// Opens an existing store without recovery, for inspection.
pub fn open_existing(path: &Path) -> Result<PersistenceDriver, Box<dyn std::error::Error>> {
    let layout = StorageDir::layout(path);
    if !layout.journal.exists() || !layout.control.exists() {
        return Err(format!("No store found at {:?}", path).into());
    }
    let config = Config::default()
        .create_if_missing(false)
        .recover_on_open(false);
    Ok(PersistenceDriver::open(path, config)?)
}

/// Renders bytes as UTF-8 where possible.
pub fn display_bytes(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
