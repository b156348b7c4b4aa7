//! Transactions and the journal-backed persistence driver.
//!
//! A transaction collects mutations while OPEN, is frozen and checksummed
//! when STAGED, and ends COMMITTED once its entry is published in the
//! journal, or ABORTED.

mod driver;
mod mutation;
mod state;

pub use driver::{PersistenceDriver, RecoveryReport};
pub use mutation::{decode_mutations, encode_mutations, Mutation, MUTATION_FORMAT_VERSION};
pub use state::{Transaction, TransactionState};
