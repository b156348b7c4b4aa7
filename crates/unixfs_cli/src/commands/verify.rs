//! Verify command implementation.

use super::open_existing;
use std::path::Path;
use unixfs_core::{decode_mutations, PersistenceDriver, SequenceNumber};

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of entries checked.
    pub entries_checked: u64,
    /// Number of valid entries.
    pub valid_entries: u64,
    /// Number of corrupt entries.
    pub corrupt_entries: u64,
    /// Reserved but unpublished sequences.
    pub stranded: u64,
    /// Published entries not yet applied to the DataStore.
    pub unapplied: u64,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    /// True when no corruption or counter damage was found.
    pub fn is_ok(&self) -> bool {
        self.corrupt_entries == 0 && self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying store at {:?}", path);
    println!();

    let driver = open_existing(path)?;
    let result = verify(&driver);
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Store verification passed");
        Ok(())
    } else {
        println!("✗ Store verification failed");
        Err("Verification failed".into())
    }
}

/// Checks the counters and every retained journal entry.
pub fn verify(driver: &PersistenceDriver) -> VerifyResult {
    let mut result = VerifyResult::default();
    let journal = driver.journal();

    if let Err(err) = journal.counter().validate() {
        result.errors.push(err.to_string());
        return result;
    }

    let snapshot = journal.snapshot();
    result.stranded = snapshot.size();
    let max_applied = driver.max_applied_sequence().as_u64();
    if max_applied > snapshot.trailing {
        result.errors.push(format!(
            "DataStore applied sequence {} beyond trailing counter {}",
            max_applied, snapshot.trailing
        ));
    }
    result.unapplied = snapshot.trailing.saturating_sub(max_applied);

    for seq in journal.retained_range() {
        result.entries_checked += 1;
        let checked = journal.read(SequenceNumber::new(seq)).and_then(|entry| {
            if entry.committed {
                decode_mutations(&entry.payload).map(|_| ())
            } else {
                Ok(())
            }
        });
        match checked {
            Ok(()) => result.valid_entries += 1,
            Err(err) => {
                result.corrupt_entries += 1;
                result.errors.push(format!("sequence {}: {}", seq, err));
            }
        }
    }

    result
}

fn print_result(result: &VerifyResult) {
    println!("Journal:");
    println!("  Entries checked: {}", result.entries_checked);
    println!("  Valid entries:   {}", result.valid_entries);
    println!("  Corrupt entries: {}", result.corrupt_entries);
    println!("  Stranded:        {}", result.stranded);
    println!("  Unapplied:       {}", result.unapplied);

    if !result.errors.is_empty() {
        println!("  Errors:");
        for error in result.errors.iter().take(10) {
            println!("    - {}", error);
        }
        if result.errors.len() > 10 {
            println!("    ... and {} more", result.errors.len() - 10);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use unixfs_core::{Config, ControlRegion, DataStore, TransactionJournal};
    use unixfs_storage::InMemoryBackend;

    #[test]
    fn detects_corrupt_entry() {
        let config = Config::new().capacity(8).slot_size(256);
        let backend = Arc::new(InMemoryBackend::new());
        let journal = TransactionJournal::with_backend(
            backend.clone(),
            Arc::new(ControlRegion::anonymous().unwrap()),
            &config,
        )
        .unwrap();
        let store = DataStore::open(Box::new(InMemoryBackend::new()), false).unwrap();
        let driver = PersistenceDriver::new(store, journal, config).unwrap();

        for key in [b"a", b"b"] {
            let mut txn = driver.begin();
            driver.stage(&mut txn, key, b"v").unwrap();
            driver.commit(&mut txn).unwrap();
        }
        assert!(verify(&driver).is_ok());

        backend.corrupt_byte(driver.journal().slot_offset(SequenceNumber::new(2)) + 40);
        let result = verify(&driver);
        assert_eq!(result.entries_checked, 2);
        assert_eq!(result.corrupt_entries, 1);
        assert!(!result.is_ok());
    }
}
