//! Stress tests for the persistence driver.
//!
//! These tests verify behavior under heavy load and concurrent commits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use unixfs_core::{CoreResult, PersistenceDriver};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of transactions to run.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Size of each value in bytes.
    pub value_size: usize,
    /// Number of distinct keys.
    pub key_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            value_size: 64,
            key_count: 1_000,
        }
    }
}

fn key(index: usize) -> [u8; 8] {
    (index as u64).to_be_bytes()
}

fn commit_put(driver: &PersistenceDriver, key: &[u8], value: &[u8]) -> CoreResult<()> {
    let mut txn = driver.begin();
    driver.stage(&mut txn, key, value)?;
    driver.commit(&mut txn)?;
    Ok(())
}

/// Run a sequential commit stress test.
pub fn stress_sequential_commits(driver: &PersistenceDriver, config: &StressConfig) -> StressTestResult {
    let value = vec![0xABu8; config.value_size];

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        match commit_put(driver, &key(i % config.key_count), &value) {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a mixed put/delete/abort stress test.
///
/// One in three transactions deletes its key, one in three is aborted.
pub fn stress_mixed_transactions(driver: &PersistenceDriver, config: &StressConfig) -> StressTestResult {
    let value = vec![0xCDu8; config.value_size];

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let key = key(i % config.key_count);
        let mut txn = driver.begin();
        let result = match i % 3 {
            0 => driver
                .stage(&mut txn, &key, &value)
                .and_then(|()| driver.commit(&mut txn).map(|_| ())),
            1 => driver
                .stage_delete(&mut txn, &key)
                .and_then(|()| driver.commit(&mut txn).map(|_| ())),
            _ => driver
                .stage(&mut txn, &key, &value)
                .and_then(|()| driver.abort(&mut txn)),
        };

        match result {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a concurrent commit stress test.
///
/// Each thread writes its own key range, so every commit must be visible
/// afterwards.
pub fn stress_concurrent_commits(
    driver: Arc<PersistenceDriver>,
    config: &StressConfig,
) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.operations / config.threads;
    let value = vec![0xEFu8; config.value_size];

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let driver = Arc::clone(&driver);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let value = value.clone();

            thread::spawn(move || {
                for i in 0..ops_per_thread {
                    match commit_put(&driver, &key(t * ops_per_thread + i), &value) {
                        Ok(()) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Run a large transaction stress test.
///
/// Batches as many puts per transaction as fit in one journal slot.
pub fn stress_large_transactions(driver: &PersistenceDriver, config: &StressConfig) -> StressTestResult {
    let value = vec![0x11u8; config.value_size];
    let per_put = 1 + 4 + 8 + 4 + config.value_size;
    let batch_size = (driver.journal().max_payload_size().saturating_sub(5) / per_put).max(1);

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for batch in 0..(config.operations / batch_size) {
        let mut txn = driver.begin();
        let result = (0..batch_size)
            .try_for_each(|i| {
                driver.stage(&mut txn, &key((batch * batch_size + i) % config.key_count), &value)
            })
            .and_then(|()| driver.commit(&mut txn).map(|_| ()));

        match result {
            Ok(()) => successful += batch_size,
            Err(_) => failed += batch_size,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}
