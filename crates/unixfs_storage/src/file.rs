//! File-based storage backend for persistent storage.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::platform::{read_exact_at, write_all_at};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// A file-based storage backend.
///
/// Reads and in-place writes are positional and take no lock, so many
/// threads can fill disjoint journal slots at once. Operations that change
/// the file length (`append`, `preallocate`, `truncate`) serialize on an
/// internal mutex guarding the tracked size.
///
/// # Durability
///
/// - `flush()` calls `File::sync_data()`
/// - `sync()` calls `File::sync_all()`, which also persists the file length
///
/// # Example
///
/// ```no_run
/// use unixfs_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("journal.dat")).unwrap();
/// backend.preallocate(4096).unwrap();
/// backend.write_at(64, b"slot bytes").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: File,
    size: Mutex<u64>,
}

impl FileBackend {
    /// Opens or creates a file backend at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            size: Mutex::new(size),
        })
    }

    /// Opens or creates a file backend, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or file cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = *self.size.lock();
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        let mut buffer = vec![0u8; len];
        if len > 0 {
            read_exact_at(&self.file, &mut buffer, offset)?;
        }
        Ok(buffer)
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        let size = *self.size.lock();
        let end = offset.saturating_add(data.len() as u64);

        if end > size {
            return Err(StorageError::WritePastEnd {
                offset,
                len: data.len(),
                size,
            });
        }

        if !data.is_empty() {
            write_all_at(&self.file, data, offset)?;
        }
        Ok(())
    }

    fn append(&self, data: &[u8]) -> StorageResult<u64> {
        let mut size = self.size.lock();
        let offset = *size;

        if !data.is_empty() {
            write_all_at(&self.file, data, offset)?;
            *size += data.len() as u64;
        }

        Ok(offset)
    }

    fn preallocate(&self, len: u64) -> StorageResult<()> {
        let mut size = self.size.lock();
        if len > *size {
            self.file.set_len(len)?;
            *size = len;
        }
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn sync(&self) -> StorageResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(*self.size.lock())
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        let mut size = self.size.lock();

        if new_size > *size {
            return Err(StorageError::InvalidTruncate {
                new_size,
                size: *size,
            });
        }

        self.file.set_len(new_size)?;
        self.file.sync_all()?;
        *size = new_size;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
    }

    #[test]
    fn file_append_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let backend = FileBackend::open(&path).unwrap();

        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.size().unwrap(), 11);
        assert_eq!(backend.read_at(0, 11).unwrap(), b"hello world");
    }

    #[test]
    fn file_write_at_requires_allocation() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("test.bin")).unwrap();

        let result = backend.write_at(0, b"abc");
        assert!(matches!(result, Err(StorageError::WritePastEnd { .. })));

        backend.preallocate(8).unwrap();
        backend.write_at(5, b"abc").unwrap();
        assert_eq!(backend.read_at(0, 8).unwrap(), b"\0\0\0\0\0abc");
    }

    #[test]
    fn file_preallocate_never_shrinks() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("test.bin")).unwrap();

        backend.preallocate(128).unwrap();
        backend.preallocate(16).unwrap();
        assert_eq!(backend.size().unwrap(), 128);
    }

    #[test]
    fn file_read_past_end_fails() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("test.bin")).unwrap();
        backend.append(b"hello").unwrap();

        let result = backend.read_at(3, 5);
        assert!(matches!(result, Err(StorageError::ReadPastEnd { .. })));
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend.preallocate(32).unwrap();
            backend.write_at(16, b"persistent").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 32);
        assert_eq!(backend.read_at(16, 10).unwrap(), b"persistent");
    }

    #[test]
    fn file_truncate() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("test.bin")).unwrap();
        backend.append(b"hello world").unwrap();

        backend.truncate(5).unwrap();
        assert_eq!(backend.size().unwrap(), 5);
        assert!(matches!(
            backend.truncate(50),
            Err(StorageError::InvalidTruncate { .. })
        ));
    }

    #[test]
    fn file_concurrent_disjoint_writes() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(FileBackend::open(&dir.path().join("slots.bin")).unwrap());
        backend.preallocate(8 * 64).unwrap();

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let backend = Arc::clone(&backend);
                thread::spawn(move || {
                    backend.write_at(u64::from(i) * 64, &[i; 64]).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for i in 0..8u8 {
            assert_eq!(backend.read_at(u64::from(i) * 64, 64).unwrap(), vec![i; 64]);
        }
    }

    #[test]
    fn file_create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("path").join("test.bin");

        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert_eq!(backend.path(), path);
    }
}
