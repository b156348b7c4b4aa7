//! Engine configuration.

use crate::checksum::ChecksumAlgorithm;
use crate::error::{CoreError, CoreResult};
use crate::journal::SLOT_HEADER_SIZE;
use std::time::Duration;

/// What `append` does when every slot of the ring is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullPolicy {
    /// Return [`CoreError::JournalFull`] immediately.
    FailFast,
    /// Sleep `backoff` between reservation attempts, then give up with
    /// [`CoreError::JournalFull`].
    Retry {
        /// Number of additional reservation attempts.
        attempts: u32,
        /// Pause between attempts.
        backoff: Duration,
    },
}

impl Default for FullPolicy {
    fn default() -> Self {
        Self::FailFast
    }
}

/// Configuration for opening a journal and its DataStore.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of slots in the journal ring.
    ///
    /// Must exceed the number of entries that can be published but not yet
    /// applied to the DataStore.
    pub capacity: u64,

    /// Size in bytes of one journal slot, slot header included.
    pub slot_size: u32,

    /// Checksum algorithm for newly created journals.
    ///
    /// An existing journal keeps the algorithm recorded in its header.
    pub checksum_algorithm: ChecksumAlgorithm,

    /// Behavior of `append` when the ring is full.
    pub full_policy: FullPolicy,

    /// Whether to flush the slot file after every append (safer but slower).
    pub sync_on_commit: bool,

    /// Whether to create the storage directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether opening a driver runs recovery before returning.
    pub recover_on_open: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: 4096,
            slot_size: 4096,
            checksum_algorithm: ChecksumAlgorithm::Adler32,
            full_policy: FullPolicy::FailFast,
            sync_on_commit: true,
            create_if_missing: true,
            recover_on_open: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ring capacity in slots.
    #[must_use]
    pub const fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the slot size in bytes.
    #[must_use]
    pub const fn slot_size(mut self, slot_size: u32) -> Self {
        self.slot_size = slot_size;
        self
    }

    /// Sets the checksum algorithm for new journals.
    #[must_use]
    pub const fn checksum_algorithm(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum_algorithm = algorithm;
        self
    }

    /// Sets the full-ring policy.
    #[must_use]
    pub const fn full_policy(mut self, policy: FullPolicy) -> Self {
        self.full_policy = policy;
        self
    }

    /// Sets whether to flush on every append.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets whether to create the directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to run recovery when the driver opens.
    #[must_use]
    pub const fn recover_on_open(mut self, value: bool) -> Self {
        self.recover_on_open = value;
        self
    }

    /// Largest payload a slot of this configuration can carry.
    #[must_use]
    pub const fn max_payload_size(&self) -> usize {
        (self.slot_size as usize).saturating_sub(SLOT_HEADER_SIZE)
    }

    /// Checks the configuration for values the journal cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> CoreResult<()> {
        if self.capacity == 0 {
            return Err(CoreError::invalid_config("capacity must be at least 1"));
        }
        if self.capacity > i64::MAX as u64 {
            return Err(CoreError::invalid_config(format!(
                "capacity {} exceeds the ordering horizon of 2^63",
                self.capacity
            )));
        }
        if (self.slot_size as usize) <= SLOT_HEADER_SIZE {
            return Err(CoreError::invalid_config(format!(
                "slot size {} must be larger than the {SLOT_HEADER_SIZE}-byte slot header",
                self.slot_size
            )));
        }
        if let FullPolicy::Retry { attempts: 0, .. } = self.full_policy {
            return Err(CoreError::invalid_config(
                "retry policy needs at least one attempt",
            ));
        }
        Ok(())
    }
}
