//! Storage directory management.
//!
//! ```text
//! <root>/
//! ├─ LOCK                     # Advisory lock, one driver per directory
//! ├─ journal.ctl              # Mapped counters (leading, trailing, txn id)
//! ├─ journal.dat              # Journal header + slot ring
//! ├─ datastore.dat            # DataStore record log
//! └─ datastore.dat.compact    # Only present while compaction runs
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::warn;

const LOCK_FILE: &str = "LOCK";
const CONTROL_FILE: &str = "journal.ctl";
const JOURNAL_FILE: &str = "journal.dat";
const DATASTORE_FILE: &str = "datastore.dat";
const COMPACT_FILE: &str = "datastore.dat.compact";

/// File locations inside a storage root.
///
/// Computing a layout takes no lock; offline tools use it to find files
/// of a directory another driver may hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    /// Mapped control file.
    pub control: PathBuf,
    /// Journal slot file.
    pub journal: PathBuf,
    /// DataStore log.
    pub datastore: PathBuf,
    /// Compaction output.
    pub compact: PathBuf,
}

impl StorageLayout {
    /// Layout of the storage root at `root`.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            control: root.join(CONTROL_FILE),
            journal: root.join(JOURNAL_FILE),
            datastore: root.join(DATASTORE_FILE),
            compact: root.join(COMPACT_FILE),
        }
    }
}

/// An exclusively locked storage directory.
///
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct StorageDir {
    path: PathBuf,
    _lock_file: File,
}

impl StorageDir {
    /// Opens or creates a storage directory and takes its lock.
    ///
    /// A compaction output left behind by a crash is removed; the original
    /// DataStore log is still intact in that case.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `DirectoryLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "storage directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DirectoryLocked);
        }

        let dir = Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        };

        let leftover = dir.compact_path();
        if leftover.exists() {
            warn!(path = %leftover.display(), "removing unfinished compaction output");
            fs::remove_file(&leftover)?;
        }

        Ok(dir)
    }

    /// Layout of the storage root at `root`.
    #[must_use]
    pub fn layout(root: &Path) -> StorageLayout {
        StorageLayout::new(root)
    }

    /// Root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the mapped control file.
    #[must_use]
    pub fn control_path(&self) -> PathBuf {
        self.path.join(CONTROL_FILE)
    }

    /// Path of the journal slot file.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.path.join(JOURNAL_FILE)
    }

    /// Path of the DataStore log.
    #[must_use]
    pub fn datastore_path(&self) -> PathBuf {
        self.path.join(DATASTORE_FILE)
    }

    /// Path compaction writes to before renaming over the DataStore log.
    #[must_use]
    pub fn compact_path(&self) -> PathBuf {
        self.path.join(COMPACT_FILE)
    }

    /// Atomically replaces the DataStore log with the compaction output.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the rename fails.
    pub fn install_compacted(&self) -> CoreResult<()> {
        fs::rename(self.compact_path(), self.datastore_path())?;
        // Persist the rename itself.
        #[cfg(unix)]
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }
}
