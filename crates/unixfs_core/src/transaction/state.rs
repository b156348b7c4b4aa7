//! Transaction handle and lifecycle states.

use super::mutation::Mutation;
use crate::error::{CoreError, CoreResult};
use crate::types::{SequenceNumber, TransactionId};
use std::fmt;

/// Lifecycle state of a transaction.
///
/// ```text
/// OPEN ──prepare──▶ STAGED ──commit──▶ COMMITTED
///   │                 │
///   └──────abort──────┴──────────────▶ ABORTED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Accepting mutations.
    Open,
    /// Mutation set frozen and encoded, not yet in the journal.
    Staged,
    /// Entry published in the journal.
    Committed,
    /// Discarded; nothing from it is visible.
    Aborted,
}

impl TransactionState {
    /// Returns true for committed and aborted transactions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "OPEN",
            Self::Staged => "STAGED",
            Self::Committed => "COMMITTED",
            Self::Aborted => "ABORTED",
        })
    }
}

/// Encoded payload of a staged transaction.
#[derive(Debug, Clone)]
pub(crate) struct Prepared {
    pub(crate) payload: Vec<u8>,
    pub(crate) checksum: u32,
}

/// A transaction being built by a caller.
///
/// Created by [`PersistenceDriver::begin`](super::PersistenceDriver::begin)
/// and driven through its lifecycle by the driver. Mutations are kept in
/// staged order.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    mutations: Vec<Mutation>,
    prepared: Option<Prepared>,
    sequence: Option<SequenceNumber>,
}

impl Transaction {
    pub(crate) fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Open,
            mutations: Vec::new(),
            prepared: None,
            sequence: None,
        }
    }

    /// Transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Staged mutations in order.
    #[must_use]
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Journal sequence, once committed.
    #[must_use]
    pub fn sequence(&self) -> Option<SequenceNumber> {
        self.sequence
    }

    /// Checksum of the encoded payload, once staged.
    #[must_use]
    pub fn checksum(&self) -> Option<u32> {
        self.prepared.as_ref().map(|p| p.checksum)
    }

    pub(crate) fn require(&self, expected: &'static str, allowed: &[TransactionState]) -> CoreResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(CoreError::InvalidState {
                transaction: self.id,
                expected,
                actual: self.state,
            })
        }
    }

    pub(crate) fn push(&mut self, mutation: Mutation) -> CoreResult<()> {
        self.require("OPEN", &[TransactionState::Open])?;
        self.mutations.push(mutation);
        Ok(())
    }

    pub(crate) fn stage(&mut self, prepared: Prepared) {
        self.prepared = Some(prepared);
        self.state = TransactionState::Staged;
    }

    pub(crate) fn prepared(&self) -> Option<&Prepared> {
        self.prepared.as_ref()
    }

    pub(crate) fn mark_committed(&mut self, sequence: SequenceNumber) {
        self.sequence = Some(sequence);
        self.state = TransactionState::Committed;
    }

    pub(crate) fn mark_aborted(&mut self) {
        self.state = TransactionState::Aborted;
    }
}
