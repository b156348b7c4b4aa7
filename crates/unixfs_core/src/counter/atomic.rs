//! A single 64-bit counter inside the control region.

use super::region::ControlRegion;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// A u64 counter at a fixed offset of a [`ControlRegion`].
///
/// Reads and CAS updates go straight to the mapped bytes, so a successful
/// [`compare_and_set`](Self::compare_and_set) is visible to every other
/// mapping of the same file. A failed CAS is a normal outcome under
/// contention, not an error.
#[derive(Debug, Clone)]
pub struct AtomicSlotCounter {
    region: Arc<ControlRegion>,
    offset: usize,
}

impl AtomicSlotCounter {
    /// Creates a counter view at `offset` of `region`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is not a counter slot of the region.
    #[must_use]
    pub fn new(region: Arc<ControlRegion>, offset: usize) -> Self {
        // Validate eagerly rather than on first access.
        let _ = region.atomic(offset);
        Self { region, offset }
    }

    /// Returns the current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.region.atomic(self.offset).load(Ordering::SeqCst)
    }

    /// Sets the value to `updated` if it currently equals `expected`.
    ///
    /// Returns `true` if the swap happened.
    pub fn compare_and_set(&self, expected: u64, updated: u64) -> bool {
        self.region
            .atomic(self.offset)
            .compare_exchange(expected, updated, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Increments the counter and returns the new value, retrying on
    /// contention.
    pub fn increment_and_get(&self) -> u64 {
        loop {
            let current = self.get();
            let next = current.wrapping_add(1);
            if self.compare_and_set(current, next) {
                return next;
            }
            std::hint::spin_loop();
        }
    }

    /// Unconditionally stores `value`.
    ///
    /// Only for formatting a fresh region and for tests; live counters
    /// change through CAS.
    pub(crate) fn set(&self, value: u64) {
        self.region.atomic(self.offset).store(value, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::region::{LEADING_OFFSET, TRAILING_OFFSET};
    use std::thread;

    fn counter() -> AtomicSlotCounter {
        let region = Arc::new(ControlRegion::anonymous().unwrap());
        AtomicSlotCounter::new(region, LEADING_OFFSET)
    }

    #[test]
    fn compare_and_set_semantics() {
        let c = counter();
        assert_eq!(c.get(), 0);
        assert!(c.compare_and_set(0, 5));
        assert!(!c.compare_and_set(0, 6));
        assert_eq!(c.get(), 5);
    }

    #[test]
    fn counters_at_different_offsets_are_independent() {
        let region = Arc::new(ControlRegion::anonymous().unwrap());
        let a = AtomicSlotCounter::new(Arc::clone(&region), LEADING_OFFSET);
        let b = AtomicSlotCounter::new(region, TRAILING_OFFSET);
        a.set(10);
        assert_eq!(b.get(), 0);
    }

    #[test]
    fn increment_wraps_at_max() {
        let c = counter();
        c.set(u64::MAX);
        assert_eq!(c.increment_and_get(), 0);
    }

    #[test]
    fn cas_under_contention() {
        const THREADS: usize = 8;
        const ATTEMPTS: usize = 2_000;

        let c = counter();
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let c = c.clone();
                thread::spawn(move || {
                    let mut wins = Vec::new();
                    for _ in 0..ATTEMPTS {
                        let seen = c.get();
                        if c.compare_and_set(seen, seen + 1) {
                            wins.push(seen);
                        }
                    }
                    wins
                })
            })
            .collect();

        let mut observed: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        observed.sort_unstable();

        // Every successful CAS saw exactly its predecessor's result.
        assert_eq!(c.get(), observed.len() as u64);
        for (i, seen) in observed.iter().enumerate() {
            assert_eq!(*seen, i as u64);
        }
    }

    #[test]
    fn increment_and_get_is_linearizable() {
        let c = counter();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = c.clone();
                thread::spawn(move || (0..1_000).map(|_| c.increment_and_get()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        assert_eq!(all, (1..=4_000).collect::<Vec<_>>());
    }
}
