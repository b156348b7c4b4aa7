//! The transaction journal: a fixed-capacity ring of checksummed slots.

use super::entry::{JournalEntry, JournalHeader, JOURNAL_HEADER_SIZE};
use super::replay::JournalReplay;
use crate::checksum::ChecksumAlgorithm;
use crate::config::{Config, FullPolicy};
use crate::counter::{
    AtomicSlotCounter, ControlRegion, DualCounter, Snapshot, RELEASED_OFFSET, TRANSACTION_ID_OFFSET,
};
use crate::error::{CoreError, CoreResult};
use crate::types::{SequenceNumber, TransactionId};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};
use unixfs_storage::{FileBackend, StorageBackend};

/// Spins before a publishing writer starts yielding its time slice.
const PUBLISH_SPIN_LIMIT: u32 = 64;

/// Append-only, checksum-verified ring of journal entries.
///
/// Writers reserve a sequence from the leading counter, fill the slot at
/// `sequence % capacity` without any lock, and then publish it by moving the
/// trailing counter. Publication happens in sequence order, so every entry
/// at or below the trailing counter is completely written.
///
/// A published slot is not reused until its consumer calls
/// [`release`](Self::release) for it, so the ring never holds more than
/// `capacity` sequences above the released watermark.
///
/// # Thread Safety
///
/// All methods take `&self`. The journal can be shared across threads
/// behind an `Arc`; the counters also coordinate with other processes that
/// map the same control file.
pub struct TransactionJournal {
    backend: Arc<dyn StorageBackend>,
    region: Arc<ControlRegion>,
    counter: DualCounter,
    transaction_ids: AtomicSlotCounter,
    released: AtomicSlotCounter,
    /// Published sequences whose slot could not be overwritten with an
    /// aborted entry. They read as aborted until released.
    abandoned: Mutex<BTreeSet<u64>>,
    header: JournalHeader,
    full_policy: FullPolicy,
    sync_on_commit: bool,
}

impl TransactionJournal {
    /// Opens the journal stored in `journal_path` with counters in
    /// `control_path`, creating both if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the files cannot be opened, are not journal
    /// files, or disagree with each other.
    pub fn open(journal_path: &Path, control_path: &Path, config: &Config) -> CoreResult<Self> {
        let backend = Arc::new(FileBackend::open(journal_path)?);
        let region = Arc::new(ControlRegion::open(control_path)?);
        Self::with_backend(backend, region, config)
    }

    /// Opens a journal over an arbitrary backend and control region.
    ///
    /// An empty backend is formatted from `config`. A non-empty backend keeps
    /// the dimensions and checksum algorithm recorded in its header.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the header cannot
    /// be read, or the counters do not fit the journal.
    pub fn with_backend(
        backend: Arc<dyn StorageBackend>,
        region: Arc<ControlRegion>,
        config: &Config,
    ) -> CoreResult<Self> {
        config.validate()?;

        let size = backend.size()?;
        let header = if size == 0 {
            Self::format(backend.as_ref(), config)?
        } else {
            Self::load_header(backend.as_ref(), size, config)?
        };

        let counter = DualCounter::new(Arc::clone(&region), header.capacity);
        counter.validate()?;
        if size == 0 && counter.leading() != 0 {
            return Err(CoreError::invalid_format(format!(
                "control region references {} sequences but the journal is empty",
                counter.leading()
            )));
        }

        let transaction_ids = AtomicSlotCounter::new(Arc::clone(&region), TRANSACTION_ID_OFFSET);
        let released = AtomicSlotCounter::new(Arc::clone(&region), RELEASED_OFFSET);
        let snapshot = counter.get_snapshot();
        if released.get() > snapshot.trailing {
            return Err(CoreError::counter_corrupted(format!(
                "released counter {} is beyond trailing counter {}",
                released.get(),
                snapshot.trailing
            )));
        }
        info!(
            capacity = header.capacity,
            slot_size = header.slot_size,
            algorithm = %header.algorithm,
            leading = snapshot.leading,
            trailing = snapshot.trailing,
            released = released.get(),
            "journal opened"
        );

        Ok(Self {
            backend,
            region,
            counter,
            transaction_ids,
            released,
            abandoned: Mutex::new(BTreeSet::new()),
            header,
            full_policy: config.full_policy,
            sync_on_commit: config.sync_on_commit,
        })
    }

    fn format(backend: &dyn StorageBackend, config: &Config) -> CoreResult<JournalHeader> {
        let header = JournalHeader {
            algorithm: config.checksum_algorithm,
            slot_size: config.slot_size,
            capacity: config.capacity,
        };
        backend.preallocate(header.file_size())?;
        backend.write_at(0, &header.encode())?;
        backend.sync()?;
        debug!(size = header.file_size(), "formatted new journal file");
        Ok(header)
    }

    fn load_header(
        backend: &dyn StorageBackend,
        size: u64,
        config: &Config,
    ) -> CoreResult<JournalHeader> {
        if size < JOURNAL_HEADER_SIZE as u64 {
            return Err(CoreError::invalid_format(format!(
                "journal file is {size} bytes, smaller than its header"
            )));
        }
        let header = JournalHeader::decode(&backend.read_at(0, JOURNAL_HEADER_SIZE)?)?;
        if size < header.file_size() {
            return Err(CoreError::invalid_format(format!(
                "journal file is {size} bytes, header requires {}",
                header.file_size()
            )));
        }

        if header.algorithm != config.checksum_algorithm {
            warn!(
                configured = %config.checksum_algorithm,
                stored = %header.algorithm,
                "checksum algorithm differs from configuration; using the journal's"
            );
        }
        if header.capacity != config.capacity || header.slot_size != config.slot_size {
            warn!(
                configured_capacity = config.capacity,
                configured_slot_size = config.slot_size,
                stored_capacity = header.capacity,
                stored_slot_size = header.slot_size,
                "journal dimensions differ from configuration; using the journal's"
            );
        }
        Ok(header)
    }

    /// Appends an entry and publishes it. Returns its sequence number.
    ///
    /// Once a sequence is reserved the append runs to completion: if writing
    /// the slot fails, an aborted entry is written in its place and published
    /// so later sequences are not blocked, and the write error is returned.
    /// If the aborted entry cannot be written either, the sequence is still
    /// published but reads as aborted for as long as this journal is open.
    ///
    /// The slot is flushed before it is published. A failure to flush the
    /// control region afterwards is logged and does not fail the append:
    /// the entry is already visible, and a reopened journal publishes a
    /// valid stranded slot as it is.
    ///
    /// # Errors
    ///
    /// - [`CoreError::PayloadTooLarge`] if `payload` does not fit in a slot
    /// - [`CoreError::JournalFull`] if no slot frees up under the full policy
    /// - [`CoreError::InvalidOperation`] if the sequence space is exhausted
    /// - storage errors from writing the slot
    pub fn append(&self, payload: &[u8], transaction_id: TransactionId) -> CoreResult<SequenceNumber> {
        let max = self.header.max_payload_size();
        if payload.len() > max {
            return Err(CoreError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }

        let sequence = SequenceNumber::new(self.reserve()?);
        let entry = JournalEntry::new(
            sequence,
            transaction_id,
            self.header.algorithm,
            payload.to_vec(),
        );

        if let Err(err) = self.write_entry(&entry) {
            warn!(%sequence, %transaction_id, error = %err, "journal write failed, publishing aborted entry");
            let marker = JournalEntry::aborted(sequence, transaction_id, self.header.algorithm);
            if let Err(marker_err) = self.write_entry(&marker) {
                warn!(%sequence, error = %marker_err, "could not write aborted entry");
                self.abandon(sequence);
            }
            self.publish(sequence);
            return Err(err);
        }

        self.publish(sequence);
        if self.sync_on_commit {
            if let Err(err) = self.region.flush() {
                warn!(%sequence, error = %err, "control region flush failed after publish");
            }
        }
        Ok(sequence)
    }

    fn abandon(&self, sequence: SequenceNumber) {
        let released = self.released.get();
        let mut abandoned = self.abandoned.lock();
        abandoned.retain(|&seq| seq > released);
        abandoned.insert(sequence.as_u64());
    }

    fn reserve(&self) -> CoreResult<u64> {
        match self.full_policy {
            FullPolicy::FailFast => self.try_reserve(),
            FullPolicy::Retry { attempts, backoff } => {
                let mut remaining = attempts;
                loop {
                    match self.try_reserve() {
                        Err(err) if err.is_retryable() && remaining > 0 => {
                            remaining -= 1;
                            debug!(remaining, "journal full, backing off");
                            thread::sleep(backoff);
                        }
                        other => return other,
                    }
                }
            }
        }
    }

    fn try_reserve(&self) -> CoreResult<u64> {
        self.counter
            .increment_and_get_leading_bounded(&self.released, SequenceNumber::LAST.as_u64())
    }

    fn write_entry(&self, entry: &JournalEntry) -> CoreResult<()> {
        self.backend
            .write_at(self.header.slot_offset(entry.sequence), &entry.encode())?;
        if self.sync_on_commit {
            self.backend.flush()?;
        }
        Ok(())
    }

    /// Waits for every earlier sequence to be published, then publishes
    /// `sequence`.
    fn publish(&self, sequence: SequenceNumber) {
        let mut spins = 0u32;
        while !self.counter.compare_and_advance_trailing(sequence.as_u64()) {
            if spins < PUBLISH_SPIN_LIMIT {
                spins += 1;
                std::hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
    }

    /// Reads and verifies the entry stored under `sequence`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::EntryNotPublished`] if `sequence` is zero or beyond the
    ///   trailing counter
    /// - [`CoreError::EntryOverwritten`] if the slot has been reused by a
    ///   later sequence
    /// - [`CoreError::CorruptEntry`] if the slot fails verification
    pub fn read(&self, sequence: SequenceNumber) -> CoreResult<JournalEntry> {
        let seq = sequence.as_u64();
        let trailing = self.counter.trailing();
        if seq == 0 || seq > trailing {
            return Err(CoreError::EntryNotPublished {
                sequence: seq,
                trailing,
            });
        }
        let capacity = self.header.capacity;
        if self.counter.leading() >= seq.saturating_add(capacity) {
            return Err(CoreError::EntryOverwritten {
                sequence: seq,
                capacity,
            });
        }

        if self.abandoned.lock().contains(&seq) {
            return Ok(JournalEntry::aborted(
                sequence,
                TransactionId::new(0),
                self.header.algorithm,
            ));
        }

        let slot = self.backend.read_at(
            self.header.slot_offset(sequence),
            self.header.slot_size as usize,
        )?;
        let entry = JournalEntry::decode(&slot, self.header.algorithm, seq)?;
        if entry.sequence != sequence {
            return Err(CoreError::EntryOverwritten {
                sequence: seq,
                capacity,
            });
        }
        Ok(entry)
    }

    /// Iterates published entries from `from` up to the trailing counter as
    /// it is now.
    ///
    /// A start of zero is treated as one.
    #[must_use]
    pub fn replay_from(&self, from: SequenceNumber) -> JournalReplay<'_> {
        JournalReplay::new(self, from, SequenceNumber::new(self.counter.trailing()))
    }

    /// Marks every sequence up to `sequence` as consumed, letting writers
    /// reuse their slots. Releasing below the current watermark is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EntryNotPublished`] if `sequence` is beyond the
    /// trailing counter.
    pub fn release(&self, sequence: SequenceNumber) -> CoreResult<()> {
        let seq = sequence.as_u64();
        let trailing = self.counter.trailing();
        if seq > trailing {
            return Err(CoreError::EntryNotPublished {
                sequence: seq,
                trailing,
            });
        }
        loop {
            let current = self.released.get();
            if current >= seq || self.released.compare_and_set(current, seq) {
                return Ok(());
            }
            std::hint::spin_loop();
        }
    }

    /// Last released sequence.
    #[must_use]
    pub fn released(&self) -> SequenceNumber {
        SequenceNumber::new(self.released.get())
    }

    /// Moves the released watermark to exactly `sequence`, in either
    /// direction. Only for an owner that has exclusive use of the journal.
    pub(crate) fn reset_released(&self, sequence: SequenceNumber) {
        self.released.set(sequence.as_u64());
    }

    /// Allocates a transaction id unique across all users of the control
    /// region.
    #[must_use]
    pub fn next_transaction_id(&self) -> TransactionId {
        TransactionId::new(self.transaction_ids.increment_and_get())
    }

    /// Publishes sequences that were reserved but never published.
    ///
    /// Such sequences are left behind when a writer dies between reserving
    /// and publishing. A slot that already holds a valid entry for its
    /// sequence is published as it is; any other slot is overwritten with an
    /// aborted entry first. Returns the number of sequences published.
    ///
    /// Must not run concurrently with [`append`](Self::append).
    ///
    /// # Errors
    ///
    /// Returns storage errors, or [`CoreError::CounterCorrupted`] if the
    /// trailing counter moves underneath the reclaim.
    pub fn reclaim_stranded(&self) -> CoreResult<u64> {
        let snapshot = self.counter.get_snapshot();
        if snapshot.is_empty() {
            return Ok(0);
        }

        let mut reclaimed = 0;
        for seq in snapshot.in_flight() {
            let sequence = SequenceNumber::new(seq);
            let slot = self.backend.read_at(
                self.header.slot_offset(sequence),
                self.header.slot_size as usize,
            )?;
            match JournalEntry::decode(&slot, self.header.algorithm, seq) {
                Ok(entry) if entry.sequence == sequence => {
                    info!(%sequence, committed = entry.committed, "publishing stranded entry");
                }
                _ => {
                    warn!(%sequence, "filling stranded reservation with aborted entry");
                    let marker =
                        JournalEntry::aborted(sequence, TransactionId::new(0), self.header.algorithm);
                    self.backend
                        .write_at(self.header.slot_offset(sequence), &marker.encode())?;
                }
            }
            if !self.counter.compare_and_advance_trailing(seq) {
                return Err(CoreError::counter_corrupted(format!(
                    "trailing counter moved while reclaiming sequence {seq}"
                )));
            }
            reclaimed += 1;
        }

        self.sync()?;
        Ok(reclaimed)
    }

    /// Flushes the slot file and the control region to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if either flush fails.
    pub fn sync(&self) -> CoreResult<()> {
        self.backend.sync()?;
        self.region.flush()
    }

    /// Sequences whose slots have not been reused, oldest first.
    ///
    /// Empty when nothing has been published.
    #[must_use]
    pub fn retained_range(&self) -> RangeInclusive<u64> {
        let trailing = self.counter.trailing();
        let leading = self.counter.leading();
        let oldest = leading.saturating_sub(self.header.capacity).saturating_add(1).max(1);
        oldest..=trailing
    }

    /// Captures the counters.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.counter.get_snapshot()
    }

    /// The leading/trailing counter pair.
    #[must_use]
    pub fn counter(&self) -> &DualCounter {
        &self.counter
    }

    /// The layout recorded in the file header.
    #[must_use]
    pub fn header(&self) -> &JournalHeader {
        &self.header
    }

    /// Ring capacity in slots.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.header.capacity
    }

    /// Slot size in bytes.
    #[must_use]
    pub fn slot_size(&self) -> u32 {
        self.header.slot_size
    }

    /// Checksum algorithm of this journal.
    #[must_use]
    pub fn checksum_algorithm(&self) -> ChecksumAlgorithm {
        self.header.algorithm
    }

    /// Largest payload an entry can carry.
    #[must_use]
    pub fn max_payload_size(&self) -> usize {
        self.header.max_payload_size()
    }

    /// Byte offset of the slot holding `sequence`.
    #[must_use]
    pub fn slot_offset(&self, sequence: SequenceNumber) -> u64 {
        self.header.slot_offset(sequence)
    }
}

impl std::fmt::Debug for TransactionJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionJournal")
            .field("header", &self.header)
            .field("snapshot", &self.counter.get_snapshot())
            .field("released", &self.released.get())
            .field("full_policy", &self.full_policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::SLOT_HEADER_SIZE;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;
    use unixfs_storage::InMemoryBackend;

    fn config(capacity: u64) -> Config {
        Config::new()
            .capacity(capacity)
            .slot_size(128)
            .sync_on_commit(false)
    }

    fn memory_journal(capacity: u64) -> (Arc<InMemoryBackend>, TransactionJournal) {
        let backend = Arc::new(InMemoryBackend::new());
        let region = Arc::new(ControlRegion::anonymous().unwrap());
        let journal =
            TransactionJournal::with_backend(backend.clone(), region, &config(capacity)).unwrap();
        (backend, journal)
    }

    #[test]
    fn append_and_read() {
        let (_, journal) = memory_journal(4);
        let txid = journal.next_transaction_id();
        let seq = journal.append(b"hello", txid).unwrap();
        assert_eq!(seq, SequenceNumber::new(1));

        let entry = journal.read(seq).unwrap();
        assert_eq!(entry.payload, b"hello");
        assert_eq!(entry.transaction_id, txid);
        assert!(entry.committed);
    }

    #[test]
    fn read_unpublished() {
        let (_, journal) = memory_journal(4);
        assert!(matches!(
            journal.read(SequenceNumber::ZERO),
            Err(CoreError::EntryNotPublished { .. })
        ));
        assert!(matches!(
            journal.read(SequenceNumber::new(1)),
            Err(CoreError::EntryNotPublished { sequence: 1, trailing: 0 })
        ));
    }

    #[test]
    fn wrapped_slots_report_overwritten() {
        let (_, journal) = memory_journal(2);
        for i in 0..3u8 {
            let seq = journal.append(&[i], TransactionId::new(1)).unwrap();
            journal.release(seq).unwrap();
        }
        assert!(matches!(
            journal.read(SequenceNumber::new(1)),
            Err(CoreError::EntryOverwritten { sequence: 1, capacity: 2 })
        ));
        assert_eq!(journal.read(SequenceNumber::new(3)).unwrap().payload, vec![2]);
        assert_eq!(journal.retained_range(), 2..=3);
    }

    #[test]
    fn payload_limit() {
        let (_, journal) = memory_journal(2);
        let max = journal.max_payload_size();
        assert_eq!(max, 128 - SLOT_HEADER_SIZE);
        assert!(journal.append(&vec![0; max], TransactionId::new(1)).is_ok());
        assert!(matches!(
            journal.append(&vec![0; max + 1], TransactionId::new(1)),
            Err(CoreError::PayloadTooLarge { .. })
        ));
        // Rejected payloads do not consume a sequence.
        assert_eq!(journal.snapshot().leading, 1);
    }

    #[test]
    fn corrupting_any_slot_byte_is_detected() {
        let (backend, journal) = memory_journal(4);
        let seq = journal.append(b"mutations", TransactionId::new(5)).unwrap();
        let offset = journal.slot_offset(seq);
        let covered = (SLOT_HEADER_SIZE + b"mutations".len()) as u64;

        for i in 0..covered {
            backend.corrupt_byte(offset + i);
            let result = journal.read(seq);
            assert!(
                matches!(result, Err(CoreError::CorruptEntry { .. }) | Err(CoreError::EntryOverwritten { .. })),
                "byte {i} not detected: {result:?}"
            );
            backend.corrupt_byte(offset + i);
        }
        assert!(journal.read(seq).is_ok());
    }

    #[test]
    fn replay_yields_published_range() {
        let (_, journal) = memory_journal(8);
        for i in 1..=5u8 {
            journal.append(&[i], TransactionId::new(u64::from(i))).unwrap();
        }

        let payloads: Vec<u8> = journal
            .replay_from(SequenceNumber::new(3))
            .map(|e| e.unwrap().payload[0])
            .collect();
        assert_eq!(payloads, vec![3, 4, 5]);

        let replay = journal.replay_from(SequenceNumber::ZERO);
        journal.append(&[6], TransactionId::new(6)).unwrap();
        // The watermark was captured at creation.
        assert_eq!(replay.count(), 5);
    }

    #[test]
    fn fail_fast_when_full() {
        let (_, journal) = memory_journal(2);
        journal.counter().increment_and_get_leading().unwrap();
        journal.counter().increment_and_get_leading().unwrap();
        let err = journal.append(b"x", TransactionId::new(1)).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn published_slots_are_kept_until_released() {
        let (_, journal) = memory_journal(2);
        journal.append(b"a", TransactionId::new(1)).unwrap();
        journal.append(b"b", TransactionId::new(2)).unwrap();

        // Nothing is in flight, but both slots still hold unconsumed entries.
        assert!(journal.snapshot().is_empty());
        let err = journal.append(b"c", TransactionId::new(3)).unwrap_err();
        assert!(matches!(err, CoreError::JournalFull { capacity: 2, leading: 2, trailing: 2 }));
        assert_eq!(journal.read(SequenceNumber::new(1)).unwrap().payload, b"a");

        journal.release(SequenceNumber::new(1)).unwrap();
        assert_eq!(journal.released(), SequenceNumber::new(1));
        assert_eq!(journal.append(b"c", TransactionId::new(3)).unwrap(), SequenceNumber::new(3));
        assert_eq!(journal.read(SequenceNumber::new(2)).unwrap().payload, b"b");
    }

    #[test]
    fn release_is_monotonic_and_bounded_by_trailing() {
        let (_, journal) = memory_journal(4);
        journal.append(b"a", TransactionId::new(1)).unwrap();
        journal.append(b"b", TransactionId::new(2)).unwrap();
        assert!(matches!(
            journal.release(SequenceNumber::new(3)),
            Err(CoreError::EntryNotPublished { sequence: 3, trailing: 2 })
        ));

        journal.release(SequenceNumber::new(2)).unwrap();
        journal.release(SequenceNumber::new(1)).unwrap();
        assert_eq!(journal.released(), SequenceNumber::new(2));
    }

    #[test]
    fn sequence_space_does_not_wrap() {
        let (_, journal) = memory_journal(4);
        let last = SequenceNumber::LAST.as_u64();
        journal.counter().set(last - 1, last - 1);
        journal.release(SequenceNumber::new(last - 1)).unwrap();

        assert_eq!(journal.append(b"x", TransactionId::new(1)).unwrap(), SequenceNumber::LAST);
        assert!(matches!(
            journal.append(b"y", TransactionId::new(1)),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert_eq!(journal.read(SequenceNumber::LAST).unwrap().payload, b"x");
    }

    #[test]
    fn released_beyond_trailing_is_rejected() {
        let backend = Arc::new(InMemoryBackend::new());
        let region = Arc::new(ControlRegion::anonymous().unwrap());
        TransactionJournal::with_backend(backend.clone(), Arc::clone(&region), &config(4)).unwrap();
        AtomicSlotCounter::new(Arc::clone(&region), RELEASED_OFFSET).set(3);
        assert!(matches!(
            TransactionJournal::with_backend(backend, region, &config(4)),
            Err(CoreError::CounterCorrupted { .. })
        ));
    }

    #[test]
    fn retry_policy_waits_then_fails() {
        let backend = Arc::new(InMemoryBackend::new());
        let region = Arc::new(ControlRegion::anonymous().unwrap());
        let config = config(1).full_policy(FullPolicy::Retry {
            attempts: 3,
            backoff: Duration::from_millis(5),
        });
        let journal = TransactionJournal::with_backend(backend, region, &config).unwrap();
        journal.counter().increment_and_get_leading().unwrap();

        let start = Instant::now();
        assert!(matches!(
            journal.append(b"x", TransactionId::new(1)),
            Err(CoreError::JournalFull { .. })
        ));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn reclaim_stranded_reservations() {
        let (_, journal) = memory_journal(4);
        journal.append(b"a", TransactionId::new(1)).unwrap();
        // Two writers reserved and died before publishing.
        journal.counter().increment_and_get_leading().unwrap();
        journal.counter().increment_and_get_leading().unwrap();

        assert_eq!(journal.reclaim_stranded().unwrap(), 2);
        assert!(journal.snapshot().is_empty());
        assert!(!journal.read(SequenceNumber::new(2)).unwrap().committed);
        assert!(!journal.read(SequenceNumber::new(3)).unwrap().committed);
        assert_eq!(journal.reclaim_stranded().unwrap(), 0);
    }

    #[test]
    fn reclaim_keeps_fully_written_entry() {
        let (backend, journal) = memory_journal(4);
        let seq = SequenceNumber::new(journal.counter().increment_and_get_leading().unwrap());
        let entry = JournalEntry::new(seq, TransactionId::new(7), journal.checksum_algorithm(), b"done".to_vec());
        backend.write_at(journal.slot_offset(seq), &entry.encode()).unwrap();

        assert_eq!(journal.reclaim_stranded().unwrap(), 1);
        let read = journal.read(seq).unwrap();
        assert!(read.committed);
        assert_eq!(read.payload, b"done");
    }

    #[test]
    fn concurrent_appends_publish_in_order() {
        let (_, journal) = memory_journal(64);
        let journal = Arc::new(journal);
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let journal = Arc::clone(&journal);
                thread::spawn(move || {
                    for i in 0..50u64 {
                        let payload = (t * 1000 + i).to_le_bytes();
                        loop {
                            match journal.append(&payload, TransactionId::new(t)) {
                                Ok(seq) => {
                                    journal.release(seq).unwrap();
                                    break;
                                }
                                Err(err) if err.is_retryable() => thread::yield_now(),
                                Err(err) => panic!("{err}"),
                            }
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snapshot = journal.snapshot();
        assert_eq!(snapshot.leading, 400);
        assert!(snapshot.is_empty());
        for entry in journal.replay_from(SequenceNumber::new(400 - 63)) {
            let entry = entry.unwrap();
            assert!(entry.committed);
        }
    }

    #[test]
    fn reopen_file_journal() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("journal.dat");
        let ctl = dir.path().join("journal.ctl");
        let cfg = config(4).checksum_algorithm(ChecksumAlgorithm::Crc32c);

        {
            let journal = TransactionJournal::open(&data, &ctl, &cfg).unwrap();
            journal.append(b"one", TransactionId::new(1)).unwrap();
            journal.append(b"two", TransactionId::new(2)).unwrap();
            journal.sync().unwrap();
        }

        // Stored header wins over a different configuration.
        let other = config(16).checksum_algorithm(ChecksumAlgorithm::Adler32);
        let journal = TransactionJournal::open(&data, &ctl, &other).unwrap();
        assert_eq!(journal.capacity(), 4);
        assert_eq!(journal.checksum_algorithm(), ChecksumAlgorithm::Crc32c);
        assert_eq!(journal.read(SequenceNumber::new(2)).unwrap().payload, b"two");
    }

    #[test]
    fn transaction_ids_are_shared_through_the_region() {
        let dir = tempdir().unwrap();
        let ctl = dir.path().join("journal.ctl");
        let a = TransactionJournal::open(&dir.path().join("a.dat"), &ctl, &config(4)).unwrap();
        let id1 = a.next_transaction_id();
        let region = Arc::new(ControlRegion::open(&ctl).unwrap());
        let ids = AtomicSlotCounter::new(region, TRANSACTION_ID_OFFSET);
        assert_eq!(ids.get(), id1.as_u64());
        assert!(a.next_transaction_id() > id1);
    }

    #[test]
    fn empty_journal_with_used_counters_is_rejected() {
        let backend = Arc::new(InMemoryBackend::new());
        let region = Arc::new(ControlRegion::anonymous().unwrap());
        DualCounter::new(Arc::clone(&region), 4).set(2, 2);
        assert!(matches!(
            TransactionJournal::with_backend(backend, region, &config(4)),
            Err(CoreError::InvalidFormat { .. })
        ));
    }
}
