//! Memory-mapped control region holding the journal counters.
//!
//! ```text
//! journal.ctl (64 bytes, little endian)
//! ┌────────┬───────┬───────┬──────────┬─────────┬──────────┬──────────┬──────────┬──────────┐
//! │ "JCTL" │ major │ minor │ reserved │ leading │ trailing │ next txn │ released │ reserved │
//! │ 0..4   │ 4..6  │ 6..8  │ 8..16    │ 16..24  │ 24..32   │ 32..40   │ 40..48   │ 48..64   │
//! └────────┴───────┴───────┴──────────┴─────────┴──────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! Counters are read and written in place through `AtomicU64` views, so every
//! thread and every process mapping the file observes the same values.

#![allow(unsafe_code)]

use crate::error::{CoreError, CoreResult};
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;

/// Magic bytes at the start of the control file.
pub const CONTROL_MAGIC: [u8; 4] = *b"JCTL";

/// Control file format version (major, minor).
pub const CONTROL_VERSION: (u16, u16) = (1, 0);

/// Total size of the control file.
pub const CONTROL_SIZE: usize = 64;

/// Offset of the leading (reservation) counter.
pub const LEADING_OFFSET: usize = 16;

/// Offset of the trailing (publication) counter.
pub const TRAILING_OFFSET: usize = 24;

/// Offset of the transaction id counter.
pub const TRANSACTION_ID_OFFSET: usize = 32;

/// Offset of the released counter: the last sequence whose slot the
/// consumer of the journal no longer needs.
pub const RELEASED_OFFSET: usize = 40;

/// A fixed-layout mapped region shared by all counters of one journal.
pub struct ControlRegion {
    mmap: MmapMut,
    base: *mut u8,
    path: Option<PathBuf>,
}

// SAFETY: `base` points into `mmap`, which lives as long as the region and is
// never remapped. All mutation after construction goes through `AtomicU64`.
unsafe impl Send for ControlRegion {}
// SAFETY: see above; shared access only hands out `&AtomicU64`.
unsafe impl Sync for ControlRegion {}

impl ControlRegion {
    /// Maps the control file at `path`, formatting it if it is new or empty.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened or mapped, or
    /// [`CoreError::InvalidFormat`] if an existing file is not a control file.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();
        let fresh = len == 0;
        if fresh {
            file.set_len(CONTROL_SIZE as u64)?;
        } else if len != CONTROL_SIZE as u64 {
            return Err(CoreError::invalid_format(format!(
                "control file {} is {len} bytes, expected {CONTROL_SIZE}",
                path.display()
            )));
        }

        // SAFETY: the file is owned by this journal directory; concurrent
        // writers only touch the counters, and only through atomics.
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };
        if fresh {
            Self::format(&mut mmap);
            mmap.flush()?;
        } else {
            Self::check_header(&mmap, path)?;
        }

        Ok(Self::from_mmap(mmap, Some(path.to_path_buf())))
    }

    /// Creates a process-private region that is not backed by a file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the anonymous mapping fails.
    pub fn anonymous() -> CoreResult<Self> {
        let mut mmap = MmapMut::map_anon(CONTROL_SIZE)?;
        Self::format(&mut mmap);
        Ok(Self::from_mmap(mmap, None))
    }

    fn from_mmap(mut mmap: MmapMut, path: Option<PathBuf>) -> Self {
        let base = mmap.as_mut_ptr();
        Self { mmap, base, path }
    }

    fn format(mmap: &mut MmapMut) {
        mmap[..CONTROL_SIZE].fill(0);
        mmap[0..4].copy_from_slice(&CONTROL_MAGIC);
        mmap[4..6].copy_from_slice(&CONTROL_VERSION.0.to_le_bytes());
        mmap[6..8].copy_from_slice(&CONTROL_VERSION.1.to_le_bytes());
    }

    fn check_header(mmap: &MmapMut, path: &Path) -> CoreResult<()> {
        if mmap[0..4] != CONTROL_MAGIC {
            return Err(CoreError::invalid_format(format!(
                "bad control file magic in {}",
                path.display()
            )));
        }
        let major = u16::from_le_bytes([mmap[4], mmap[5]]);
        if major != CONTROL_VERSION.0 {
            return Err(CoreError::invalid_format(format!(
                "unsupported control file version {major} in {}",
                path.display()
            )));
        }
        Ok(())
    }

    /// Path of the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flushes the mapped bytes to the backing file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if `msync` fails.
    pub fn flush(&self) -> CoreResult<()> {
        self.mmap.flush()?;
        Ok(())
    }

    /// Returns the atomic view of the 8 bytes at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is not an 8-aligned counter slot inside the region.
    pub(crate) fn atomic(&self, offset: usize) -> &AtomicU64 {
        assert!(
            offset % 8 == 0 && offset >= LEADING_OFFSET && offset + 8 <= CONTROL_SIZE,
            "counter offset {offset} outside the counter area"
        );
        // SAFETY: the mapping is page aligned and `offset` is a multiple of 8
        // inside it, so the pointer is valid and aligned for `AtomicU64` for
        // the lifetime of `self`.
        unsafe { &*self.base.add(offset).cast::<AtomicU64>() }
    }
}

impl std::fmt::Debug for ControlRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlRegion")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
