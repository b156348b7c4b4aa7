//! Materialized key/value table fed by the journal.

use super::record::{DataRecord, Decoded, RECORD_HEADER_SIZE, RECORD_TRAILER_SIZE};
use crate::error::{CoreError, CoreResult};
use crate::transaction::Mutation;
use crate::types::SequenceNumber;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use unixfs_storage::StorageBackend;

/// Latest state of one key.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredValue {
    /// `None` is a tombstone.
    value: Option<Vec<u8>>,
    sequence: SequenceNumber,
}

struct Inner {
    backend: Box<dyn StorageBackend>,
    entries: HashMap<Vec<u8>, StoredValue>,
    max_applied: SequenceNumber,
}

/// Result of a [`DataStore::compact`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
    /// Live keys written to the new log.
    pub live_keys: usize,
    /// Tombstones dropped.
    pub tombstones_removed: usize,
}

/// Key/value table holding the latest durable value per key.
///
/// Every change carries the sequence of the journal entry that produced it
/// and is ignored when the key already holds that sequence or a newer one,
/// so replaying an entry twice has no effect. State is persisted as an
/// append-only record log and rebuilt into memory on open.
///
/// # Invariants
///
/// - A key's stored sequence never decreases
/// - `max_applied_sequence` never decreases
/// - Memory is updated only after the log append succeeds
pub struct DataStore {
    inner: RwLock<Inner>,
    sync_on_write: bool,
}

impl DataStore {
    /// Opens a DataStore over `backend`, replaying its record log.
    ///
    /// A partially written record at the end of the log is cut off.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DataStoreCorruption`] if a record before the
    /// tail fails verification, or a storage error.
    pub fn open(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> CoreResult<Self> {
        let size = backend.size()?;
        let log = backend.read_at(0, size as usize)?;

        let mut entries: HashMap<Vec<u8>, StoredValue> = HashMap::new();
        let mut max_applied = SequenceNumber::ZERO;
        let mut offset = 0usize;
        let mut records = 0usize;

        while offset < log.len() {
            let rest = &log[offset..];
            match DataRecord::decode(rest, offset as u64) {
                Ok(Decoded::Record(record, len)) => {
                    Self::replay_record(&mut entries, &mut max_applied, record);
                    offset += len;
                    records += 1;
                }
                Ok(Decoded::Truncated) => break,
                Err(err) if Self::reaches_end(rest) => {
                    warn!(offset, error = %err, "discarding damaged record at end of DataStore log");
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        if offset < log.len() {
            warn!(
                offset,
                discarded = log.len() - offset,
                "truncating torn DataStore tail"
            );
            backend.truncate(offset as u64)?;
            backend.sync()?;
        }

        info!(
            records,
            keys = entries.len(),
            max_applied = max_applied.as_u64(),
            "DataStore opened"
        );

        Ok(Self {
            inner: RwLock::new(Inner {
                backend,
                entries,
                max_applied,
            }),
            sync_on_write,
        })
    }

    /// Returns true if the record at the front of `rest` claims to end
    /// exactly at the end of the log.
    fn reaches_end(rest: &[u8]) -> bool {
        if rest.len() < RECORD_HEADER_SIZE {
            return true;
        }
        let len = u32::from_le_bytes([rest[5], rest[6], rest[7], rest[8]]) as usize;
        RECORD_HEADER_SIZE + len + RECORD_TRAILER_SIZE == rest.len()
    }

    fn replay_record(
        entries: &mut HashMap<Vec<u8>, StoredValue>,
        max_applied: &mut SequenceNumber,
        record: DataRecord,
    ) {
        match record {
            DataRecord::Put {
                key,
                value,
                sequence,
            } => Self::install(entries, key, Some(value), sequence),
            DataRecord::Delete { key, sequence } => Self::install(entries, key, None, sequence),
            DataRecord::Watermark { sequence } => {
                *max_applied = (*max_applied).max(sequence);
            }
        }
    }

    fn install(
        entries: &mut HashMap<Vec<u8>, StoredValue>,
        key: Vec<u8>,
        value: Option<Vec<u8>>,
        sequence: SequenceNumber,
    ) {
        match entries.get(&key) {
            Some(existing) if existing.sequence >= sequence => {}
            _ => {
                entries.insert(key, StoredValue { value, sequence });
            }
        }
    }

    // Plain ordering is sound: the journal never reserves past
    // `SequenceNumber::LAST`.
    fn is_newer(entries: &HashMap<Vec<u8>, StoredValue>, key: &[u8], sequence: SequenceNumber) -> bool {
        entries
            .get(key)
            .map_or(true, |existing| existing.sequence < sequence)
    }

    fn write_log(&self, inner: &Inner, bytes: &[u8]) -> CoreResult<()> {
        inner.backend.append(bytes)?;
        if self.sync_on_write {
            inner.backend.flush()?;
        }
        Ok(())
    }

    /// Returns the current value of `key`.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner
            .read()
            .entries
            .get(key)
            .and_then(|stored| stored.value.clone())
    }

    /// Returns the current value of `key` with the sequence that wrote it.
    #[must_use]
    pub fn get_with_sequence(&self, key: &[u8]) -> Option<(Vec<u8>, SequenceNumber)> {
        self.inner.read().entries.get(key).and_then(|stored| {
            stored
                .value
                .clone()
                .map(|value| (value, stored.sequence))
        })
    }

    /// Sets `key` to `value` as of `sequence`.
    ///
    /// Returns `false` without writing if the key already holds `sequence`
    /// or a newer one. Does not move the applied watermark; see
    /// [`mark_applied`](Self::mark_applied).
    ///
    /// # Errors
    ///
    /// Returns a storage error if the log append fails.
    pub fn put(&self, key: &[u8], value: &[u8], sequence: SequenceNumber) -> CoreResult<bool> {
        let mut inner = self.inner.write();
        if !Self::is_newer(&inner.entries, key, sequence) {
            return Ok(false);
        }
        let record = DataRecord::Put {
            key: key.to_vec(),
            value: value.to_vec(),
            sequence,
        };
        self.write_log(&inner, &record.encode())?;
        Self::install(&mut inner.entries, key.to_vec(), Some(value.to_vec()), sequence);
        Ok(true)
    }

    /// Removes `key` as of `sequence`, leaving a tombstone.
    ///
    /// Returns `false` without writing if the key already holds `sequence`
    /// or a newer one.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the log append fails.
    pub fn delete(&self, key: &[u8], sequence: SequenceNumber) -> CoreResult<bool> {
        let mut inner = self.inner.write();
        if !Self::is_newer(&inner.entries, key, sequence) {
            return Ok(false);
        }
        let record = DataRecord::Delete {
            key: key.to_vec(),
            sequence,
        };
        self.write_log(&inner, &record.encode())?;
        Self::install(&mut inner.entries, key.to_vec(), None, sequence);
        Ok(true)
    }

    /// Applies every mutation of the journal entry at `sequence` and records
    /// the entry as applied, in a single log append.
    ///
    /// Later mutations of the same key win. Returns `false` if `sequence`
    /// was already applied.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the log append fails; memory is left
    /// unchanged in that case.
    pub fn apply_entry(&self, sequence: SequenceNumber, mutations: &[Mutation]) -> CoreResult<bool> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if sequence <= inner.max_applied {
            return Ok(false);
        }

        // Last mutation per key, in order of first appearance.
        let mut order: Vec<&[u8]> = Vec::new();
        let mut last: HashMap<&[u8], &Mutation> = HashMap::new();
        for mutation in mutations {
            if last.insert(mutation.key(), mutation).is_none() {
                order.push(mutation.key());
            }
        }

        let mut changes = Vec::with_capacity(order.len());
        let mut buf = Vec::new();
        for key in order {
            if !Self::is_newer(&inner.entries, key, sequence) {
                continue;
            }
            let record = match last[key] {
                Mutation::Put { key, value } => DataRecord::Put {
                    key: key.clone(),
                    value: value.clone(),
                    sequence,
                },
                Mutation::Delete { key } => DataRecord::Delete {
                    key: key.clone(),
                    sequence,
                },
            };
            record.encode_into(&mut buf);
            changes.push(record);
        }
        DataRecord::Watermark { sequence }.encode_into(&mut buf);

        self.write_log(inner, &buf)?;
        for record in changes {
            Self::replay_record(&mut inner.entries, &mut inner.max_applied, record);
        }
        inner.max_applied = sequence;
        debug!(%sequence, mutations = mutations.len(), "applied journal entry");
        Ok(true)
    }

    /// Records that every entry up to `sequence` has been applied.
    ///
    /// Used for entries that carry nothing to apply and for sequences
    /// skipped during recovery. Returns `false` if the watermark is already
    /// at or past `sequence`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the log append fails.
    pub fn mark_applied(&self, sequence: SequenceNumber) -> CoreResult<bool> {
        let mut inner = self.inner.write();
        if sequence <= inner.max_applied {
            return Ok(false);
        }
        self.write_log(&inner, &DataRecord::Watermark { sequence }.encode())?;
        inner.max_applied = sequence;
        Ok(true)
    }

    /// Highest journal sequence fully applied.
    #[must_use]
    pub fn max_applied_sequence(&self) -> SequenceNumber {
        self.inner.read().max_applied
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .entries
            .values()
            .filter(|stored| stored.value.is_some())
            .count()
    }

    /// Returns true if no key holds a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All live key/value pairs, sorted by key.
    #[must_use]
    pub fn entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let inner = self.inner.read();
        let mut out: Vec<_> = inner
            .entries
            .iter()
            .filter_map(|(key, stored)| stored.value.clone().map(|value| (key.clone(), value)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Current size of the record log in bytes.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the size cannot be read.
    pub fn log_size(&self) -> CoreResult<u64> {
        Ok(self.inner.read().backend.size()?)
    }

    /// Makes every logged change durable.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        self.inner.read().backend.sync()?;
        Ok(())
    }

    /// Rewrites the log into `target` with live keys and the watermark only,
    /// then switches to it.
    ///
    /// `install` runs after `target` is durable and before the switch; it
    /// typically renames the new file over the old one. If it fails the
    /// store keeps its current log. Tombstones can be dropped because every
    /// one of them is at or below the watermark, and replay never revisits
    /// those sequences.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if `target` is not empty, or
    /// any error from writing `target` or from `install`.
    pub fn compact<F>(&self, target: Box<dyn StorageBackend>, install: F) -> CoreResult<CompactionStats>
    where
        F: FnOnce() -> CoreResult<()>,
    {
        let mut inner = self.inner.write();
        if target.size()? != 0 {
            return Err(CoreError::invalid_operation("compaction target is not empty"));
        }

        let mut live: Vec<(&Vec<u8>, &StoredValue)> = inner
            .entries
            .iter()
            .filter(|(_, stored)| stored.value.is_some())
            .collect();
        live.sort_by(|a, b| a.0.cmp(b.0));

        let mut buf = Vec::new();
        for (key, stored) in &live {
            if let Some(value) = &stored.value {
                DataRecord::Put {
                    key: (*key).clone(),
                    value: value.clone(),
                    sequence: stored.sequence,
                }
                .encode_into(&mut buf);
            }
        }
        DataRecord::Watermark {
            sequence: inner.max_applied,
        }
        .encode_into(&mut buf);

        target.append(&buf)?;
        target.sync()?;
        install()?;

        let stats = CompactionStats {
            bytes_before: inner.backend.size()?,
            bytes_after: buf.len() as u64,
            live_keys: live.len(),
            tombstones_removed: inner.entries.len() - live.len(),
        };
        inner.entries.retain(|_, stored| stored.value.is_some());
        inner.backend = target;
        info!(
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            live_keys = stats.live_keys,
            "DataStore compacted"
        );
        Ok(stats)
    }
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("DataStore")
            .field("keys", &inner.entries.len())
            .field("max_applied", &inner.max_applied)
            .finish_non_exhaustive()
    }
}
