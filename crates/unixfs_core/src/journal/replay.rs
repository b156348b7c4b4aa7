//! Iterator over published journal entries.

use super::entry::JournalEntry;
use super::ring::TransactionJournal;
use crate::error::CoreResult;
use crate::types::SequenceNumber;

/// Ascending iterator over entries up to a fixed watermark.
///
/// The watermark is the trailing counter at creation; entries published
/// later are not visited. The iterator stops after yielding the first error,
/// so a caller can resume with a fresh
/// [`replay_from`](TransactionJournal::replay_from) at any position.
pub struct JournalReplay<'a> {
    journal: &'a TransactionJournal,
    next: SequenceNumber,
    end: SequenceNumber,
    failed: bool,
}

impl<'a> JournalReplay<'a> {
    pub(crate) fn new(journal: &'a TransactionJournal, from: SequenceNumber, end: SequenceNumber) -> Self {
        Self {
            journal,
            next: from.max(SequenceNumber::new(1)),
            end,
            failed: false,
        }
    }

    /// The next sequence that will be read.
    #[must_use]
    pub fn position(&self) -> SequenceNumber {
        self.next
    }

    /// The last sequence this iterator will visit.
    #[must_use]
    pub fn end(&self) -> SequenceNumber {
        self.end
    }
}

impl Iterator for JournalReplay<'_> {
    type Item = CoreResult<JournalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.next > self.end {
            return None;
        }
        let result = self.journal.read(self.next);
        match result {
            Ok(_) => self.next = self.next.next(),
            Err(_) => self.failed = true,
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed || self.next > self.end {
            return (0, Some(0));
        }
        let remaining = (self.end.as_u64() - self.next.as_u64() + 1) as usize;
        (0, Some(remaining))
    }
}

impl std::fmt::Debug for JournalReplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalReplay")
            .field("next", &self.next)
            .field("end", &self.end)
            .field("failed", &self.failed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::counter::ControlRegion;
    use crate::error::CoreError;
    use crate::journal::TransactionJournal;
    use crate::types::{SequenceNumber, TransactionId};
    use std::sync::Arc;
    use unixfs_storage::InMemoryBackend;

    #[test]
    fn stops_after_first_error() {
        let backend = Arc::new(InMemoryBackend::new());
        let region = Arc::new(ControlRegion::anonymous().unwrap());
        let config = Config::new().capacity(8).slot_size(64).sync_on_commit(false);
        let journal = TransactionJournal::with_backend(backend.clone(), region, &config).unwrap();
        for i in 0..4u8 {
            journal.append(&[i], TransactionId::new(1)).unwrap();
        }
        backend.corrupt_byte(journal.slot_offset(SequenceNumber::new(3)) + 2);

        let mut replay = journal.replay_from(SequenceNumber::new(1));
        assert!(replay.next().unwrap().is_ok());
        assert!(replay.next().unwrap().is_ok());
        assert!(matches!(
            replay.next(),
            Some(Err(CoreError::CorruptEntry { sequence: 3, .. }))
        ));
        assert!(replay.next().is_none());
        assert_eq!(replay.position(), SequenceNumber::new(3));

        // Resuming past the bad entry works.
        let rest: Vec<_> = journal
            .replay_from(SequenceNumber::new(4))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn empty_journal_replays_nothing() {
        let backend = Arc::new(InMemoryBackend::new());
        let region = Arc::new(ControlRegion::anonymous().unwrap());
        let journal = TransactionJournal::with_backend(backend, region, &Config::new().capacity(2).slot_size(64)).unwrap();
        assert_eq!(journal.replay_from(SequenceNumber::ZERO).count(), 0);
    }
}
