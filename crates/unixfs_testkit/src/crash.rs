//! Crash recovery testing.
//!
//! Simulates a process dying at points of the commit path by driving the
//! journal's lower-level operations directly, dropping the driver without
//! any cleanup, and reopening the directory.
//!
//! ## Test Strategy
//!
//! 1. **Crash after reservation** - slot reserved, nothing written
//! 2. **Crash before publication** - slot written, trailing not advanced
//! 3. **Crash before application** - entry published, DataStore behind
//! 4. **Torn DataStore tail** - partial record at the end of the log
//!
//! ## Usage
//!
//! ```rust,ignore
//! use unixfs_testkit::crash::{CrashRecoveryHarness, CrashPoint};
//!
//! let mut harness = CrashRecoveryHarness::new()?;
//! let result = harness.run(CrashPoint::AfterPublishBeforeApply);
//! assert!(result.passed);
//! ```

use crate::fixtures::test_config;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use unixfs_core::{
    encode_mutations, Config, CoreError, CoreResult, JournalEntry, Mutation, PersistenceDriver,
    SequenceNumber, StorageDir,
};
use unixfs_storage::{FileBackend, StorageBackend, StorageError, StorageResult};

/// Points at which a crash can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Sequence reserved, slot never written.
    AfterReserve,
    /// Slot fully written, trailing counter not advanced.
    AfterWriteBeforePublish,
    /// Entry published, DataStore not updated.
    AfterPublishBeforeApply,
    /// Partial record appended to the DataStore log.
    TornDataStoreTail,
}

impl CrashPoint {
    /// All crash points.
    pub const ALL: [Self; 4] = [
        Self::AfterReserve,
        Self::AfterWriteBeforePublish,
        Self::AfterPublishBeforeApply,
        Self::TornDataStoreTail,
    ];

    /// Whether the interrupted transaction is visible after recovery.
    #[must_use]
    pub const fn survives(self) -> bool {
        matches!(
            self,
            Self::AfterWriteBeforePublish | Self::AfterPublishBeforeApply
        )
    }
}

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Expected live keys after recovery.
    pub expected_keys: usize,
    /// Actual live keys after recovery.
    pub actual_keys: usize,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(description: &str, keys: usize) -> Self {
        Self {
            passed: true,
            description: description.to_string(),
            expected_keys: keys,
            actual_keys: keys,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(description: &str, expected: usize, actual: usize, error: &str) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_keys: expected,
            actual_keys: actual,
            error: Some(error.to_string()),
        }
    }
}

fn injected(message: &str) -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::Other, message.to_string()))
}

/// A storage backend wrapper that fails writes on demand.
///
/// Failures are armed per write: `fail_next_writes(n)` makes the next `n`
/// calls to `write_at` or `append` fail without touching the inner backend,
/// and `tear_next_write` writes half of the next buffer before failing.
pub struct FaultyBackend {
    inner: Arc<dyn StorageBackend>,
    failing_writes: AtomicUsize,
    tear_next: AtomicBool,
    fail_sync: AtomicBool,
    failures: AtomicUsize,
}

impl FaultyBackend {
    /// Wraps `inner`. No faults are armed.
    pub fn new(inner: Arc<dyn StorageBackend>) -> Self {
        Self {
            inner,
            failing_writes: AtomicUsize::new(0),
            tear_next: AtomicBool::new(false),
            fail_sync: AtomicBool::new(false),
            failures: AtomicUsize::new(0),
        }
    }

    /// Makes the next `count` writes fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Makes the next write persist only its first half, then fail.
    pub fn tear_next_write(&self) {
        self.tear_next.store(true, Ordering::SeqCst);
    }

    /// Sets whether `flush` and `sync` fail.
    pub fn set_fail_sync(&self, fail: bool) {
        self.fail_sync.store(fail, Ordering::SeqCst);
    }

    /// Disarms every fault.
    pub fn reset(&self) {
        self.failing_writes.store(0, Ordering::SeqCst);
        self.tear_next.store(false, Ordering::SeqCst);
        self.fail_sync.store(false, Ordering::SeqCst);
    }

    /// Number of injected failures so far.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    /// Consumes one armed failure, if any.
    fn take_failure(&self) -> bool {
        let armed = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        armed
    }

    fn take_tear(&self) -> bool {
        let tear = self.tear_next.swap(false, Ordering::SeqCst);
        if tear {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        tear
    }
}

impl StorageBackend for FaultyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        if self.take_tear() {
            let _ = self.inner.write_at(offset, &data[..data.len() / 2]);
            return Err(injected("simulated torn write"));
        }
        if self.take_failure() {
            return Err(injected("simulated write failure"));
        }
        self.inner.write_at(offset, data)
    }

    fn append(&self, data: &[u8]) -> StorageResult<u64> {
        if self.take_tear() {
            let _ = self.inner.append(&data[..data.len() / 2]);
            return Err(injected("simulated torn append"));
        }
        if self.take_failure() {
            return Err(injected("simulated append failure"));
        }
        self.inner.append(data)
    }

    fn preallocate(&self, len: u64) -> StorageResult<()> {
        self.inner.preallocate(len)
    }

    fn flush(&self) -> StorageResult<()> {
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(injected("simulated flush failure"));
        }
        self.inner.flush()
    }

    fn sync(&self) -> StorageResult<()> {
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(injected("simulated sync failure"));
        }
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
}

/// Test harness for crash recovery scenarios.
///
/// Each run commits two transactions normally, interrupts a third at the
/// chosen [`CrashPoint`], abandons the driver and reopens the directory.
pub struct CrashRecoveryHarness {
    temp_dir: TempDir,
    config: Config,
    /// Results of runs so far.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a harness over a fresh temporary directory.
    ///
    /// The journal has capacity 4 so the scenarios run close to the ring
    /// bound.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
            config: test_config().capacity(4),
            results: Vec::new(),
        })
    }

    /// Root directory used by the harness.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Runs one scenario and records its result.
    pub fn run(&mut self, point: CrashPoint) -> CrashRecoveryResult {
        let description = format!("crash at {point:?}");
        let expected = if point.survives() { 3 } else { 2 };
        let result = match self.simulate(point) {
            Ok(actual) if actual == expected => CrashRecoveryResult::pass(&description, actual),
            Ok(actual) => {
                CrashRecoveryResult::fail(&description, expected, actual, "unexpected key count")
            }
            Err(err) => CrashRecoveryResult::fail(&description, expected, 0, &err.to_string()),
        };
        self.results.push(result.clone());
        result
    }

    /// Runs every scenario.
    pub fn run_all(&mut self) -> Vec<CrashRecoveryResult> {
        CrashPoint::ALL.iter().map(|point| self.run(*point)).collect()
    }

    fn fresh_dir(&self, point: CrashPoint) -> CoreResult<std::path::PathBuf> {
        let path = self.temp_dir.path().join(format!("{point:?}"));
        if path.exists() {
            std::fs::remove_dir_all(&path)?;
        }
        Ok(path)
    }

    /// Returns the number of live keys after recovery.
    fn simulate(&self, point: CrashPoint) -> CoreResult<usize> {
        let path = self.fresh_dir(point)?;
        {
            let driver = PersistenceDriver::open(&path, self.config.clone())?;
            for key in [b"k1", b"k2"] {
                let mut txn = driver.begin();
                driver.stage(&mut txn, key, b"committed")?;
                driver.commit(&mut txn)?;
            }
            Self::interrupt(&driver, &path, point)?;
            // The driver is dropped here without recovery or sync, as if
            // the process had died.
        }

        let driver = PersistenceDriver::open(&path, self.config.clone())?;
        let expected_applied = SequenceNumber::new(3);
        if point != CrashPoint::TornDataStoreTail && driver.max_applied_sequence() != expected_applied {
            return Err(CoreError::invalid_operation(format!(
                "max applied sequence is {}, expected {expected_applied}",
                driver.max_applied_sequence()
            )));
        }
        if driver.get(b"k1").is_none() || driver.get(b"k2").is_none() {
            return Err(CoreError::invalid_operation("committed key lost"));
        }
        Ok(driver.store().len())
    }

    fn interrupt(driver: &PersistenceDriver, path: &Path, point: CrashPoint) -> CoreResult<()> {
        let journal = driver.journal();
        let payload = encode_mutations(&[Mutation::put("k3", "interrupted")]);
        let txid = journal.next_transaction_id();

        match point {
            CrashPoint::AfterReserve => {
                journal.counter().increment_and_get_leading()?;
            }
            CrashPoint::AfterWriteBeforePublish => {
                let sequence = SequenceNumber::new(journal.counter().increment_and_get_leading()?);
                let entry = JournalEntry::new(sequence, txid, journal.checksum_algorithm(), payload);
                let layout = StorageDir::layout(path);
                let raw = FileBackend::open(&layout.journal)?;
                raw.write_at(journal.slot_offset(sequence), &entry.encode())?;
                raw.sync()?;
            }
            CrashPoint::AfterPublishBeforeApply => {
                journal.append(&payload, txid)?;
            }
            CrashPoint::TornDataStoreTail => {
                let layout = StorageDir::layout(path);
                let raw = FileBackend::open(&layout.datastore)?;
                raw.append(b"EUDS\x01\xff\x00")?;
                raw.sync()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use unixfs_core::{ControlRegion, DataStore, TransactionJournal, TransactionState};
    use unixfs_storage::InMemoryBackend;

    #[test]
    fn process_death_before_application() {
        let mut harness = CrashRecoveryHarness::new().unwrap();
        let result = harness.run(CrashPoint::AfterPublishBeforeApply);
        assert!(result.passed, "{result:?}");
        assert_eq!(result.actual_keys, 3);
    }

    #[test]
    fn every_crash_point_recovers() {
        let mut harness = CrashRecoveryHarness::new().unwrap();
        for result in harness.run_all() {
            assert!(result.passed, "{result:?}");
        }
        assert_eq!(harness.results.len(), CrashPoint::ALL.len());
    }

    #[test]
    fn recovery_is_idempotent() {
        let harness = CrashRecoveryHarness::new().unwrap();
        let path = harness.path().join("idempotent");
        let config = test_config().capacity(4).recover_on_open(false);
        {
            let driver = PersistenceDriver::open(&path, config.clone()).unwrap();
            let payload = encode_mutations(&[Mutation::put("a", "1"), Mutation::delete("b")]);
            driver.journal().append(&payload, driver.journal().next_transaction_id()).unwrap();
            driver.journal().sync().unwrap();
        }

        let driver = PersistenceDriver::open(&path, config.clone()).unwrap();
        let first = driver.recover().unwrap();
        let state = driver.store().entries();
        let second = driver.recover().unwrap();
        assert_eq!(first.applied, 1);
        assert_eq!(second.applied, 0);
        assert_eq!(driver.store().entries(), state);
        drop(driver);

        let driver = PersistenceDriver::open(&path, config).unwrap();
        assert_eq!(driver.recover().unwrap().applied, 0);
        assert_eq!(driver.store().entries(), state);
        assert_eq!(driver.max_applied_sequence(), SequenceNumber::new(1));
    }

    fn faulty_driver() -> (Arc<FaultyBackend>, PersistenceDriver) {
        faulty_driver_with(test_config())
    }

    fn faulty_driver_with(config: Config) -> (Arc<FaultyBackend>, PersistenceDriver) {
        let faulty = Arc::new(FaultyBackend::new(Arc::new(InMemoryBackend::new())));
        let journal = TransactionJournal::with_backend(
            faulty.clone(),
            Arc::new(ControlRegion::anonymous().unwrap()),
            &config,
        )
        .unwrap();
        let store = DataStore::open(Box::new(InMemoryBackend::new()), false).unwrap();
        (faulty, PersistenceDriver::new(store, journal, config).unwrap())
    }

    #[test]
    fn append_failure_aborts_commit() {
        let (faulty, driver) = faulty_driver();
        let mut first = driver.begin();
        driver.stage(&mut first, b"kept", b"v").unwrap();
        driver.commit(&mut first).unwrap();

        faulty.fail_next_writes(1);
        let mut txn = driver.begin();
        driver.stage(&mut txn, b"lost", b"v").unwrap();
        driver.stage(&mut txn, b"kept", b"overwritten").unwrap();
        assert!(driver.commit(&mut txn).is_err());

        assert_eq!(txn.state(), TransactionState::Aborted);
        assert_eq!(faulty.failures(), 1);
        assert_eq!(driver.get(b"lost"), None);
        assert_eq!(driver.get(b"kept"), Some(b"v".to_vec()));

        // The failed sequence holds an aborted entry and does not block
        // later commits.
        let mut next = driver.begin();
        driver.stage(&mut next, b"after", b"v").unwrap();
        assert_eq!(driver.commit(&mut next).unwrap(), SequenceNumber::new(3));
        assert_eq!(driver.max_applied_sequence(), SequenceNumber::new(3));
        assert_eq!(driver.get(b"lost"), None);
    }

    #[test]
    fn torn_slot_write_aborts_commit() {
        let (faulty, driver) = faulty_driver();
        faulty.tear_next_write();
        let mut txn = driver.begin();
        driver.stage(&mut txn, b"k", b"v").unwrap();
        assert!(driver.commit(&mut txn).is_err());
        assert_eq!(txn.state(), TransactionState::Aborted);

        // The failed commit already consumed its aborted entry.
        assert_eq!(driver.max_applied_sequence(), SequenceNumber::new(1));
        let report = driver.recover().unwrap();
        assert_eq!(report.applied + report.aborted, 0);
        assert_eq!(driver.get(b"k"), None);
    }

    #[test]
    fn unwritable_slot_does_not_block_later_commits() {
        let (faulty, driver) = faulty_driver();
        // Both the entry and its aborted replacement fail to write.
        faulty.fail_next_writes(2);
        let mut failed = driver.begin();
        driver.stage(&mut failed, b"lost", b"v").unwrap();
        assert!(driver.commit(&mut failed).is_err());
        assert_eq!(failed.state(), TransactionState::Aborted);
        assert_eq!(faulty.failures(), 2);

        let entry = driver.journal().read(SequenceNumber::new(1)).unwrap();
        assert!(!entry.committed);

        for (i, key) in [b"a", b"b", b"c"].into_iter().enumerate() {
            let mut txn = driver.begin();
            driver.stage(&mut txn, key, b"v").unwrap();
            let sequence = driver.commit(&mut txn).unwrap();
            assert_eq!(sequence, SequenceNumber::new(i as u64 + 2));
            assert_eq!(txn.state(), TransactionState::Committed);
            assert_eq!(driver.get(key), Some(b"v".to_vec()));
        }
        assert_eq!(driver.max_applied_sequence(), SequenceNumber::new(4));
        assert_eq!(driver.get(b"lost"), None);
    }

    #[test]
    fn flush_failure_aborts_before_publication() {
        let (faulty, driver) = faulty_driver_with(test_config().sync_on_commit(true));
        faulty.set_fail_sync(true);
        let mut failed = driver.begin();
        driver.stage(&mut failed, b"lost", b"v").unwrap();
        assert!(driver.commit(&mut failed).is_err());
        assert_eq!(failed.state(), TransactionState::Aborted);

        faulty.reset();
        let mut txn = driver.begin();
        driver.stage(&mut txn, b"kept", b"v").unwrap();
        assert_eq!(driver.commit(&mut txn).unwrap(), SequenceNumber::new(2));

        // Nothing reported as aborted ever becomes visible.
        let report = driver.recover().unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(driver.get(b"lost"), None);
        assert_eq!(driver.get(b"kept"), Some(b"v".to_vec()));
    }

    #[test]
    fn committers_outnumbering_slots_survive_reopen() {
        let harness = CrashRecoveryHarness::new().unwrap();
        let path = harness.path().join("contended");
        let config = test_config().capacity(2);
        {
            let driver = Arc::new(PersistenceDriver::open(&path, config.clone()).unwrap());
            let handles: Vec<_> = (0..8u8)
                .map(|t| {
                    let driver = Arc::clone(&driver);
                    thread::spawn(move || {
                        for i in 0..25u8 {
                            loop {
                                let mut txn = driver.begin();
                                driver.stage(&mut txn, &[t, i], &[i]).unwrap();
                                match driver.commit(&mut txn) {
                                    Ok(_) => break,
                                    Err(err) if err.is_retryable() => thread::yield_now(),
                                    Err(err) => panic!("commit failed: {err}"),
                                }
                            }
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            assert_eq!(driver.max_applied_sequence(), SequenceNumber::new(200));
            driver.sync().unwrap();
        }

        let driver = PersistenceDriver::open(&path, config.recover_on_open(false)).unwrap();
        let report = driver.recover().unwrap();
        assert_eq!(report.applied + report.aborted + report.reclaimed, 0);
        assert_eq!(driver.store().len(), 200);
        assert_eq!(driver.get(&[7, 24]), Some(vec![24]));
        assert_eq!(driver.journal().released(), SequenceNumber::new(200));
    }

    #[test]
    fn faulty_backend_passes_through_when_disarmed() {
        let faulty = FaultyBackend::new(Arc::new(InMemoryBackend::new()));
        faulty.append(b"abc").unwrap();
        faulty.fail_next_writes(2);
        assert!(faulty.append(b"d").is_err());
        faulty.reset();
        assert_eq!(faulty.append(b"d").unwrap(), 3);
        assert_eq!(faulty.read_at(0, 4).unwrap(), b"abcd");
    }
}
