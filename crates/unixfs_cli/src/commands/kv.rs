//! Single-key get, put and delete commands.

use super::{display_bytes, open_store, OpenOptions};
use std::path::Path;
use tracing::info;

/// Prints the value of `key`, or exits with an error when it is absent.
pub fn get(path: &Path, options: &OpenOptions, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let driver = open_store(path, options)?;
    match driver.store().get_with_sequence(key.as_bytes()) {
        Some((value, sequence)) => {
            println!("{}", display_bytes(&value));
            info!(key, %sequence, "found");
            Ok(())
        }
        None => Err(format!("Key not found: {}", key).into()),
    }
}

/// Commits a transaction putting `key` = `value`.
pub fn put(
    path: &Path,
    options: &OpenOptions,
    key: &str,
    value: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let driver = open_store(path, options)?;
    let mut txn = driver.begin();
    driver.stage(&mut txn, key.as_bytes(), value.as_bytes())?;
    let sequence = driver.commit(&mut txn)?;
    driver.sync()?;
    println!("Committed {} at {}", txn.id(), sequence);
    Ok(())
}

/// Commits a transaction deleting `key`.
pub fn delete(path: &Path, options: &OpenOptions, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let driver = open_store(path, options)?;
    let mut txn = driver.begin();
    driver.stage_delete(&mut txn, key.as_bytes())?;
    let sequence = driver.commit(&mut txn)?;
    driver.sync()?;
    println!("Committed {} at {}", txn.id(), sequence);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_then_get_then_delete() {
        let dir = tempdir().unwrap();
        let options = OpenOptions {
            capacity: Some(16),
            checksum: None,
        };
        put(dir.path(), &options, "user", "alice").unwrap();
        get(dir.path(), &options, "user").unwrap();
        delete(dir.path(), &options, "user").unwrap();
        assert!(get(dir.path(), &options, "user").is_err());

        let driver = open_store(dir.path(), &options).unwrap();
        assert_eq!(driver.journal().capacity(), 16);
        assert_eq!(driver.max_applied_sequence().as_u64(), 2);
    }
}
