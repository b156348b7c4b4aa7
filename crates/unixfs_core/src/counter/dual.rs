//! Leading/trailing counter pair implementing a bounded ring of slots.

use super::atomic::AtomicSlotCounter;
use super::region::{ControlRegion, LEADING_OFFSET, TRAILING_OFFSET};
use crate::error::{CoreError, CoreResult};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Two mapped counters bounding the in-flight window of a ring.
///
/// The leading counter is the last reserved sequence and the trailing
/// counter is the last published one. `leading - trailing` (wrapping) is the
/// number of reserved slots whose entries are not yet visible, and never
/// exceeds the capacity.
#[derive(Debug, Clone)]
pub struct DualCounter {
    leading: AtomicSlotCounter,
    trailing: AtomicSlotCounter,
    capacity: u64,
}

impl DualCounter {
    /// Creates the counter pair over `region`.
    #[must_use]
    pub fn new(region: Arc<ControlRegion>, capacity: u64) -> Self {
        Self {
            leading: AtomicSlotCounter::new(Arc::clone(&region), LEADING_OFFSET),
            trailing: AtomicSlotCounter::new(region, TRAILING_OFFSET),
            capacity,
        }
    }

    /// Ring capacity in slots.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Last reserved sequence.
    #[must_use]
    pub fn leading(&self) -> u64 {
        self.leading.get()
    }

    /// Last published sequence.
    #[must_use]
    pub fn trailing(&self) -> u64 {
        self.trailing.get()
    }

    /// Reserves the next sequence and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalFull`] without reserving if `capacity`
    /// slots are already in flight.
    pub fn increment_and_get_leading(&self) -> CoreResult<u64> {
        loop {
            // Trailing first: it only grows, so the distance computed below
            // can overestimate the window but never underestimate it.
            let trailing = self.trailing.get();
            let leading = self.leading.get();
            if leading.wrapping_sub(trailing) >= self.capacity {
                return Err(CoreError::JournalFull {
                    capacity: self.capacity,
                    leading,
                    trailing,
                });
            }
            let next = leading.wrapping_add(1);
            if self.leading.compare_and_set(leading, next) {
                return Ok(next);
            }
            std::hint::spin_loop();
        }
    }

    /// Reserves the next sequence, bounding the window by a consumer
    /// watermark instead of the trailing counter.
    ///
    /// `released` is the last sequence whose slot the consumer no longer
    /// needs. It never passes trailing, so at most `capacity` sequences are
    /// ever above it and a published but unconsumed slot is never reused.
    /// Reservation stops at `last` instead of wrapping.
    ///
    /// # Errors
    ///
    /// - [`CoreError::JournalFull`] if `capacity` sequences are above
    ///   `released`
    /// - [`CoreError::InvalidOperation`] if `last` has been reserved
    pub fn increment_and_get_leading_bounded(
        &self,
        released: &AtomicSlotCounter,
        last: u64,
    ) -> CoreResult<u64> {
        loop {
            // Released only grows, so reading it first errs toward full.
            let floor = released.get();
            let leading = self.leading.get();
            if leading >= last {
                return Err(CoreError::invalid_operation(format!(
                    "sequence space exhausted at {leading}"
                )));
            }
            if leading.wrapping_sub(floor) >= self.capacity {
                return Err(CoreError::JournalFull {
                    capacity: self.capacity,
                    leading,
                    trailing: self.trailing.get(),
                });
            }
            if self.leading.compare_and_set(leading, leading + 1) {
                return Ok(leading + 1);
            }
            std::hint::spin_loop();
        }
    }

    /// Advances the trailing counter by one and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if trailing would pass leading.
    pub fn increment_and_get_trailing(&self) -> CoreResult<u64> {
        loop {
            let trailing = self.trailing.get();
            let leading = self.leading.get();
            if trailing == leading {
                return Err(CoreError::invalid_operation(format!(
                    "trailing counter {trailing} cannot pass leading counter {leading}"
                )));
            }
            let next = trailing.wrapping_add(1);
            if self.trailing.compare_and_set(trailing, next) {
                return Ok(next);
            }
            std::hint::spin_loop();
        }
    }

    /// Publishes `sequence` if it is the next one after the trailing counter.
    ///
    /// Returns `false` if trailing is not at `sequence - 1`.
    pub fn compare_and_advance_trailing(&self, sequence: u64) -> bool {
        self.trailing
            .compare_and_set(sequence.wrapping_sub(1), sequence)
    }

    /// Number of reserved but unpublished slots.
    #[must_use]
    pub fn size(&self) -> u64 {
        let trailing = self.trailing.get();
        self.leading.get().wrapping_sub(trailing)
    }

    /// Returns true if no slot is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns true if no further slot can be reserved.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.size() >= self.capacity
    }

    /// Captures both counters without locking.
    #[must_use]
    pub fn get_snapshot(&self) -> Snapshot {
        let trailing = self.trailing.get();
        let leading = self.leading.get();
        Snapshot {
            leading,
            trailing,
            capacity: self.capacity,
        }
    }

    /// Checks that the stored counters describe a valid window.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CounterCorrupted`] if more than `capacity`
    /// sequences appear to be in flight.
    pub fn validate(&self) -> CoreResult<()> {
        let snapshot = self.get_snapshot();
        if snapshot.size() > self.capacity {
            return Err(CoreError::counter_corrupted(format!(
                "leading {} is {} ahead of trailing {}, capacity {}",
                snapshot.leading,
                snapshot.size(),
                snapshot.trailing,
                self.capacity
            )));
        }
        Ok(())
    }

    /// Overwrites both counters.
    pub(crate) fn set(&self, leading: u64, trailing: u64) {
        self.trailing.set(trailing);
        self.leading.set(leading);
    }
}

/// Immutable capture of a [`DualCounter`].
///
/// Counters wrap at `u64::MAX`, so snapshots have no absolute order. They
/// are compared by forward distance from a reference snapshot, which is
/// correct as long as neither counter has moved more than 2^63 past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Snapshot {
    /// Last reserved sequence.
    pub leading: u64,
    /// Last published sequence.
    pub trailing: u64,
    /// Ring capacity.
    pub capacity: u64,
}

impl Snapshot {
    /// Orders `self` against `other`, both measured from `reference`.
    ///
    /// Leading distances are compared first, then trailing distances.
    #[must_use]
    pub fn compare_to(&self, reference: &Snapshot, other: &Snapshot) -> Ordering {
        let lead_self = self.leading.wrapping_sub(reference.leading);
        let lead_other = other.leading.wrapping_sub(reference.leading);
        lead_self.cmp(&lead_other).then_with(|| {
            let trail_self = self.trailing.wrapping_sub(reference.trailing);
            let trail_other = other.trailing.wrapping_sub(reference.trailing);
            trail_self.cmp(&trail_other)
        })
    }

    /// Number of reserved but unpublished sequences.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.leading.wrapping_sub(self.trailing)
    }

    /// Returns true if nothing was in flight.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns true if every slot was in flight.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.size() >= self.capacity
    }

    /// Sequences that were reserved but not yet published, ascending.
    pub fn in_flight(&self) -> impl Iterator<Item = u64> {
        let trailing = self.trailing;
        (1..=self.size()).map(move |i| trailing.wrapping_add(i))
    }

    /// Returns true if `sequence` was reserved but not yet published.
    #[must_use]
    pub const fn contains_in_flight(&self, sequence: u64) -> bool {
        let distance = sequence.wrapping_sub(self.trailing);
        distance >= 1 && distance <= self.size()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "leading={} trailing={} in_flight={}/{}",
            self.leading,
            self.trailing,
            self.size(),
            self.capacity
        )
    }
}
