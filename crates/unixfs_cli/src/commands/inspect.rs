//! Inspect command implementation.

use super::open_existing;
use serde::Serialize;
use std::path::Path;
use unixfs_core::StorageDir;
use unixfs_storage::{FileBackend, StorageBackend};

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Leading counter (highest reserved sequence).
    pub leading: u64,
    /// Trailing counter (highest published sequence).
    pub trailing: u64,
    /// Highest sequence whose slot may be reused.
    pub released: u64,
    /// Reserved but unpublished sequences.
    pub in_flight: u64,
    /// Journal capacity in slots.
    pub capacity: u64,
    /// Slot size in bytes.
    pub slot_size: u32,
    /// Largest payload a slot holds.
    pub max_payload_size: usize,
    /// Checksum algorithm.
    pub checksum: String,
    /// Oldest sequence whose slot is still intact.
    pub oldest_retained: u64,
    /// Highest sequence applied to the DataStore.
    pub max_applied: u64,
    /// Published entries the DataStore has not applied.
    pub unapplied: u64,
    /// Live keys.
    pub live_keys: usize,
    /// Journal file size in bytes.
    pub journal_size: u64,
    /// DataStore log size in bytes.
    pub datastore_size: u64,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let driver = open_existing(path)?;
    let journal = driver.journal();
    let snapshot = journal.snapshot();
    let max_applied = driver.max_applied_sequence().as_u64();
    let layout = StorageDir::layout(path);

    let result = InspectResult {
        path: path.display().to_string(),
        leading: snapshot.leading,
        trailing: snapshot.trailing,
        released: journal.released().as_u64(),
        in_flight: snapshot.size(),
        capacity: journal.capacity(),
        slot_size: journal.slot_size(),
        max_payload_size: journal.max_payload_size(),
        checksum: journal.checksum_algorithm().to_string(),
        oldest_retained: *journal.retained_range().start(),
        max_applied,
        unapplied: snapshot.trailing.saturating_sub(max_applied),
        live_keys: driver.store().len(),
        journal_size: FileBackend::open(&layout.journal)?.size()?,
        datastore_size: driver.store().log_size()?,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Store: {}", result.path);
    println!();
    println!("Counters:");
    println!("  Leading:   {}", result.leading);
    println!("  Trailing:  {}", result.trailing);
    println!("  Released:  {}", result.released);
    println!("  In flight: {}/{}", result.in_flight, result.capacity);
    println!();
    println!("Journal:");
    println!("  Capacity:        {} slots", result.capacity);
    println!("  Slot size:       {} bytes", result.slot_size);
    println!("  Max payload:     {} bytes", result.max_payload_size);
    println!("  Checksum:        {}", result.checksum);
    println!("  Oldest retained: {}", result.oldest_retained);
    println!("  File size:       {} bytes", result.journal_size);
    println!();
    println!("DataStore:");
    println!("  Max applied: {}", result.max_applied);
    println!("  Unapplied:   {}", result.unapplied);
    println!("  Live keys:   {}", result.live_keys);
    println!("  Log size:    {} bytes", result.datastore_size);
}
