//! Dump command implementation.

use super::{display_bytes, open_existing};
use serde::Serialize;
use std::path::Path;
use unixfs_core::{decode_mutations, JournalEntry, Mutation, SequenceNumber, TransactionJournal};

/// Journal entry representation for output.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Sequence number.
    pub sequence: u64,
    /// Transaction id (zero for reclaimed reservations).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<u64>,
    /// COMMITTED, ABORTED or ERROR.
    pub status: String,
    /// Stored checksum.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<u32>,
    /// Payload size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_size: Option<usize>,
    /// Decoded mutations.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mutations: Vec<MutationInfo>,
    /// Why the entry could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Mutation representation for output.
#[derive(Debug, Serialize)]
pub struct MutationInfo {
    /// PUT or DELETE.
    pub kind: String,
    /// Key, lossily decoded as UTF-8.
    pub key: String,
    /// Value size for puts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_size: Option<usize>,
}

impl From<&Mutation> for MutationInfo {
    fn from(mutation: &Mutation) -> Self {
        match mutation {
            Mutation::Put { key, value } => Self {
                kind: "PUT".to_string(),
                key: display_bytes(key),
                value_size: Some(value.len()),
            },
            Mutation::Delete { key } => Self {
                kind: "DELETE".to_string(),
                key: display_bytes(key),
                value_size: None,
            },
        }
    }
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    from: u64,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let driver = open_existing(path)?;
    let entries = read_entries(driver.journal(), from, limit);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            print_text_output(&entries);
        }
    }

    Ok(())
}

fn describe(entry: &JournalEntry) -> EntryInfo {
    let mut info = EntryInfo {
        sequence: entry.sequence.as_u64(),
        transaction_id: Some(entry.transaction_id.as_u64()),
        status: if entry.committed { "COMMITTED" } else { "ABORTED" }.to_string(),
        checksum: Some(entry.checksum),
        payload_size: Some(entry.payload.len()),
        mutations: Vec::new(),
        error: None,
    };
    if entry.committed {
        match decode_mutations(&entry.payload) {
            Ok(mutations) => info.mutations = mutations.iter().map(MutationInfo::from).collect(),
            Err(err) => info.error = Some(err.to_string()),
        }
    }
    info
}

/// Reads retained entries starting at `from`, keeping unreadable ones as
/// error rows.
pub fn read_entries(journal: &TransactionJournal, from: u64, limit: Option<usize>) -> Vec<EntryInfo> {
    let retained = journal.retained_range();
    let start = from.max(*retained.start());
    let max_entries = limit.unwrap_or(usize::MAX);

    (start..=*retained.end())
        .take(max_entries)
        .map(|seq| match journal.read(SequenceNumber::new(seq)) {
            Ok(entry) => describe(&entry),
            Err(err) => EntryInfo {
                sequence: seq,
                transaction_id: None,
                status: "ERROR".to_string(),
                checksum: None,
                payload_size: None,
                mutations: Vec::new(),
                error: Some(err.to_string()),
            },
        })
        .collect()
}

fn print_text_output(entries: &[EntryInfo]) {
    println!("Journal Entries:");
    println!("{:-<72}", "");

    for entry in entries {
        print!("{:>10}  {:<9}", entry.sequence, entry.status);
        if let Some(txid) = entry.transaction_id {
            print!("  txn:{:016X}", txid);
        }
        if let Some(size) = entry.payload_size {
            print!("  {} bytes", size);
        }
        println!();
        for mutation in &entry.mutations {
            match mutation.value_size {
                Some(size) => println!("            {} {} ({} bytes)", mutation.kind, mutation.key, size),
                None => println!("            {} {}", mutation.kind, mutation.key),
            }
        }
        if let Some(error) = &entry.error {
            println!("            error: {}", error);
        }
    }

    println!("{:-<72}", "");
    println!("Total: {} entries", entries.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use unixfs_core::{Config, PersistenceDriver};

    #[test]
    fn dumps_committed_entries() {
        let dir = tempdir().unwrap();
        let driver = PersistenceDriver::open(dir.path(), Config::new().capacity(8)).unwrap();
        let mut txn = driver.begin();
        driver.stage(&mut txn, b"k", b"value").unwrap();
        driver.stage_delete(&mut txn, b"gone").unwrap();
        driver.commit(&mut txn).unwrap();

        let entries = read_entries(driver.journal(), 0, None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, "COMMITTED");
        assert_eq!(entries[0].mutations.len(), 2);
        assert_eq!(entries[0].mutations[0].value_size, Some(5));
        assert_eq!(entries[0].mutations[1].kind, "DELETE");
    }

    #[test]
    fn limit_and_start() {
        let dir = tempdir().unwrap();
        let driver = PersistenceDriver::open(dir.path(), Config::new().capacity(8)).unwrap();
        for _ in 0..5 {
            let mut txn = driver.begin();
            driver.commit(&mut txn).unwrap();
        }
        let entries = read_entries(driver.journal(), 3, Some(2));
        let sequences: Vec<_> = entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![3, 4]);
    }
}
