//! Lock-free counters living in a memory-mapped control file.
//!
//! - [`ControlRegion`] owns the mapping and its fixed layout
//! - [`AtomicSlotCounter`] is one u64 at a fixed offset
//! - [`DualCounter`] pairs the leading and trailing counters of the journal
//!   ring and produces [`Snapshot`]s

mod atomic;
mod dual;
mod region;

pub use atomic::AtomicSlotCounter;
pub use dual::{DualCounter, Snapshot};
pub use region::{
    ControlRegion, CONTROL_MAGIC, CONTROL_SIZE, CONTROL_VERSION, LEADING_OFFSET, RELEASED_OFFSET,
    TRAILING_OFFSET, TRANSACTION_ID_OFFSET,
};
