//! Journal-backed transactional persistence driver.

use super::mutation::{decode_mutations, encode_mutations, Mutation};
use super::state::{Prepared, Transaction, TransactionState};
use crate::config::Config;
use crate::datastore::{CompactionStats, DataStore};
use crate::dir::StorageDir;
use crate::error::{CoreError, CoreResult};
use crate::journal::{JournalEntry, TransactionJournal};
use crate::types::SequenceNumber;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use unixfs_storage::FileBackend;

/// Outcome of [`PersistenceDriver::recover`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryReport {
    /// Stranded reservations published before replay.
    pub reclaimed: u64,
    /// First sequence considered.
    pub start: SequenceNumber,
    /// Trailing watermark replay ran up to.
    pub end: SequenceNumber,
    /// Committed entries applied to the DataStore.
    pub applied: u64,
    /// Aborted entries passed over.
    pub aborted: u64,
    /// Sequence at which a corrupt entry stopped replay.
    pub truncated_at: Option<SequenceNumber>,
    /// Entries lost because they followed the corrupt one.
    pub skipped: u64,
}

impl fmt::Display for RecoveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "replayed {}..={}: {} applied, {} aborted, {} reclaimed",
            self.start.as_u64(),
            self.end.as_u64(),
            self.applied,
            self.aborted,
            self.reclaimed
        )?;
        if let Some(at) = self.truncated_at {
            write!(f, ", truncated at {} ({} skipped)", at.as_u64(), self.skipped)?;
        }
        Ok(())
    }
}

/// Drives transactions through the journal into the DataStore.
///
/// Commit encodes the staged mutations, appends them to the journal and
/// then applies every published entry the DataStore has not seen yet, in
/// sequence order. The journal is authoritative: anything published is
/// eventually applied, either by the next commit or by [`recover`].
///
/// [`recover`]: Self::recover
///
/// # Thread Safety
///
/// The driver is `Send + Sync`. Appends from many threads proceed without a
/// lock; application to the DataStore is serialized. [`recover`] waits for
/// appends in progress and holds new ones off until it returns.
///
/// Each applied entry is released back to the journal, so a slot is reused
/// only after the DataStore has seen its entry.
pub struct PersistenceDriver {
    dir: Option<StorageDir>,
    config: Config,
    journal: TransactionJournal,
    store: DataStore,
    apply_lock: Mutex<()>,
    /// Shared by appends, exclusive for recovery.
    append_gate: RwLock<()>,
}

impl PersistenceDriver {
    /// Opens the storage directory at `path`.
    ///
    /// Takes the directory lock, opens the DataStore and the journal, and
    /// runs [`recover`](Self::recover) when `config.recover_on_open` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the directory is
    /// locked or unreadable, any file is malformed, or recovery fails.
    pub fn open(path: &Path, config: Config) -> CoreResult<Self> {
        config.validate()?;
        let dir = StorageDir::open(path, config.create_if_missing)?;

        let store = DataStore::open(
            Box::new(FileBackend::open(&dir.datastore_path())?),
            config.sync_on_commit,
        )?;
        let journal =
            TransactionJournal::open(&dir.journal_path(), &dir.control_path(), &config)?;

        let mut driver = Self::new(store, journal, config)?;
        driver.dir = Some(dir);

        if driver.config.recover_on_open {
            let report = driver.recover()?;
            info!(%report, "recovery finished");
        }
        Ok(driver)
    }

    /// Assembles a driver from an opened DataStore and journal.
    ///
    /// No recovery runs; call [`recover`](Self::recover) if the journal may
    /// hold entries the DataStore has not applied. The journal's released
    /// watermark is moved to the DataStore's applied sequence.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CounterCorrupted`] if the DataStore has applied
    /// sequences the journal never published.
    pub fn new(store: DataStore, journal: TransactionJournal, config: Config) -> CoreResult<Self> {
        let applied = store.max_applied_sequence().as_u64();
        let trailing = journal.counter().trailing();
        if applied > trailing {
            return Err(CoreError::counter_corrupted(format!(
                "DataStore applied sequence {applied} but the journal only published {trailing}"
            )));
        }
        let released = journal.released();
        if released.as_u64() != applied {
            debug!(%released, applied, "moving released watermark to the DataStore");
            journal.reset_released(SequenceNumber::new(applied));
        }
        Ok(Self {
            dir: None,
            config,
            journal,
            store,
            apply_lock: Mutex::new(()),
            append_gate: RwLock::new(()),
        })
    }

    /// Starts a new transaction.
    #[must_use]
    pub fn begin(&self) -> Transaction {
        let txn = Transaction::new(self.journal.next_transaction_id());
        debug!(transaction = %txn.id(), "begin");
        txn
    }

    /// Stages a put of `key` = `value`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] unless the transaction is open.
    pub fn stage(&self, txn: &mut Transaction, key: &[u8], value: &[u8]) -> CoreResult<()> {
        txn.push(Mutation::put(key, value))
    }

    /// Stages a delete of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] unless the transaction is open.
    pub fn stage_delete(&self, txn: &mut Transaction, key: &[u8]) -> CoreResult<()> {
        txn.push(Mutation::delete(key))
    }

    /// Freezes the mutation list, encodes it and checksums the payload.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidState`] unless the transaction is open
    /// - [`CoreError::PayloadTooLarge`] if the encoded set does not fit in a
    ///   journal slot; the transaction stays open
    pub fn prepare(&self, txn: &mut Transaction) -> CoreResult<()> {
        txn.require("OPEN", &[TransactionState::Open])?;
        let payload = encode_mutations(txn.mutations());
        let max = self.journal.max_payload_size();
        if payload.len() > max {
            return Err(CoreError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }
        let checksum = self.journal.checksum_algorithm().checksum(&payload);
        txn.stage(Prepared { payload, checksum });
        Ok(())
    }

    /// Commits the transaction and returns its journal sequence.
    ///
    /// An open transaction is prepared first. If preparing or appending
    /// fails the transaction is aborted and nothing becomes visible. If the
    /// append succeeds but applying to the DataStore fails, the transaction
    /// is committed, the error is returned, and the entry is applied by a
    /// later commit or by recovery.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidState`] for committed or aborted transactions
    /// - [`CoreError::JournalFull`], [`CoreError::PayloadTooLarge`] or
    ///   storage errors from the append
    /// - [`CoreError::InvalidOperation`] if the sequence space is exhausted
    /// - errors from applying published entries
    pub fn commit(&self, txn: &mut Transaction) -> CoreResult<SequenceNumber> {
        txn.require("OPEN or STAGED", &[TransactionState::Open, TransactionState::Staged])?;
        if txn.state() == TransactionState::Open {
            if let Err(err) = self.prepare(txn) {
                txn.mark_aborted();
                return Err(err);
            }
        }

        let appended = match txn.prepared() {
            Some(prepared) => {
                let computed = self.journal.checksum_algorithm().checksum(&prepared.payload);
                if computed == prepared.checksum {
                    let _gate = self.append_gate.read();
                    self.journal.append(&prepared.payload, txn.id())
                } else {
                    Err(CoreError::invalid_operation(format!(
                        "staged payload of {} changed after prepare",
                        txn.id()
                    )))
                }
            }
            None => Err(CoreError::invalid_operation(format!(
                "{} is staged without a payload",
                txn.id()
            ))),
        };

        let sequence = match appended {
            Ok(sequence) => sequence,
            Err(err) => {
                warn!(transaction = %txn.id(), error = %err, "commit failed, transaction aborted");
                txn.mark_aborted();
                // A failed write still publishes its sequence; consume it
                // so the slot can be reused.
                if let Err(drain_err) = self.drain() {
                    warn!(error = %drain_err, "drain after failed commit failed");
                }
                return Err(err);
            }
        };
        txn.mark_committed(sequence);
        debug!(transaction = %txn.id(), %sequence, "committed");

        self.drain()?;
        Ok(sequence)
    }

    /// Discards the transaction. Nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] for committed or aborted
    /// transactions.
    pub fn abort(&self, txn: &mut Transaction) -> CoreResult<()> {
        txn.require("OPEN or STAGED", &[TransactionState::Open, TransactionState::Staged])?;
        txn.mark_aborted();
        debug!(transaction = %txn.id(), "aborted");
        Ok(())
    }

    /// Applies every published entry the DataStore has not applied yet.
    ///
    /// Returns the number of entries processed.
    ///
    /// # Errors
    ///
    /// Returns the first read or apply error; entries before it stay
    /// applied.
    pub fn drain(&self) -> CoreResult<u64> {
        let _guard = self.apply_lock.lock();
        let from = self.store.max_applied_sequence().next();
        let mut processed = 0;
        for entry in self.journal.replay_from(from) {
            self.apply(&entry?)?;
            processed += 1;
        }
        Ok(processed)
    }

    fn apply(&self, entry: &JournalEntry) -> CoreResult<()> {
        if entry.committed {
            let mutations = decode_mutations(&entry.payload).map_err(|err| {
                CoreError::corrupt_entry(entry.sequence.as_u64(), err.to_string())
            })?;
            self.store.apply_entry(entry.sequence, &mutations)?;
        } else {
            self.store.mark_applied(entry.sequence)?;
        }
        self.journal.release(entry.sequence)
    }

    /// Brings the DataStore up to the journal after a restart.
    ///
    /// Publishes stranded reservations, then replays from the DataStore's
    /// watermark + 1 up to the trailing counter. A corrupt entry ends replay:
    /// the entries before it stay applied, it and everything after it up to
    /// the watermark are logged as lost and skipped. Running recovery again
    /// applies nothing new.
    ///
    /// Commits in progress finish their appends first, and new appends wait
    /// until recovery returns, so only reservations of dead writers are
    /// reclaimed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EntryOverwritten`] if an unapplied entry has
    /// already been reused by the ring, or storage errors.
    pub fn recover(&self) -> CoreResult<RecoveryReport> {
        let _gate = self.append_gate.write();
        let _guard = self.apply_lock.lock();
        let mut report = RecoveryReport {
            reclaimed: self.journal.reclaim_stranded()?,
            start: self.store.max_applied_sequence().next(),
            ..RecoveryReport::default()
        };

        let mut replay = self.journal.replay_from(report.start);
        report.end = replay.end();
        while let Some(result) = replay.next() {
            let (sequence, outcome) = match result {
                Ok(entry) => (entry.sequence, self.apply(&entry).map(|()| entry.committed)),
                Err(err) => (replay.position(), Err(err)),
            };
            match outcome {
                Ok(true) => report.applied += 1,
                Ok(false) => report.aborted += 1,
                Err(err) if err.is_corruption() => {
                    report.truncated_at = Some(sequence);
                    report.skipped = report.end.as_u64() - sequence.as_u64() + 1;
                    warn!(
                        %sequence,
                        skipped = report.skipped,
                        error = %err,
                        "corrupt journal entry, discarding it and every later entry"
                    );
                    self.store.mark_applied(report.end)?;
                    self.journal.release(report.end)?;
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        self.store.sync()?;
        self.journal.sync()?;
        Ok(report)
    }

    /// Reads a key from the DataStore.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.store.get(key)
    }

    /// Highest sequence applied to the DataStore.
    #[must_use]
    pub fn max_applied_sequence(&self) -> SequenceNumber {
        self.store.max_applied_sequence()
    }

    /// Flushes the journal and the DataStore.
    ///
    /// # Errors
    ///
    /// Returns an error if either sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        self.journal.sync()?;
        self.store.sync()
    }

    /// Rewrites the DataStore log with live state only.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for drivers without a storage
    /// directory, or errors from writing and installing the new log.
    pub fn compact(&self) -> CoreResult<CompactionStats> {
        let dir = self
            .dir
            .as_ref()
            .ok_or_else(|| CoreError::invalid_operation("compaction needs a storage directory"))?;
        let _guard = self.apply_lock.lock();

        let target_path = dir.compact_path();
        if target_path.exists() {
            fs::remove_file(&target_path)?;
        }
        let target = FileBackend::open(&target_path)?;
        self.store
            .compact(Box::new(target), || dir.install_compacted())
    }

    /// The journal.
    #[must_use]
    pub fn journal(&self) -> &TransactionJournal {
        &self.journal
    }

    /// The DataStore.
    #[must_use]
    pub fn store(&self) -> &DataStore {
        &self.store
    }

    /// The configuration the driver was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Root directory, for drivers opened from a path.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(StorageDir::path)
    }
}

impl fmt::Debug for PersistenceDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceDriver")
            .field("path", &self.path())
            .field("journal", &self.journal)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
