//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random mutation sets and
//! transaction workloads, plus a reference model the driver's state can be
//! compared against.

use proptest::prelude::*;
use std::collections::BTreeMap;
use unixfs_core::{CoreResult, Mutation, PersistenceDriver};

/// Strategy for generating keys from a small space, so workloads overwrite
/// and delete keys they wrote earlier.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..4, 1..3)
}

/// Strategy for generating values (arbitrary bytes, possibly empty).
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..32)
}

/// Strategy for generating a single mutation.
pub fn mutation_strategy() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        3 => (key_strategy(), value_strategy()).prop_map(|(key, value)| Mutation::put(key, value)),
        1 => key_strategy().prop_map(Mutation::delete),
    ]
}

/// How a generated transaction ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Commit directly from OPEN.
    Commit,
    /// Prepare, then commit.
    PrepareCommit,
    /// Abort.
    Abort,
}

/// A generated transaction.
#[derive(Debug, Clone)]
pub struct GeneratedTransaction {
    /// Mutations in staging order.
    pub mutations: Vec<Mutation>,
    /// How it ends.
    pub outcome: Outcome,
}

/// Strategy for generating a transaction.
pub fn transaction_strategy() -> impl Strategy<Value = GeneratedTransaction> {
    (
        prop::collection::vec(mutation_strategy(), 0..6),
        prop_oneof![
            4 => Just(Outcome::Commit),
            2 => Just(Outcome::PrepareCommit),
            1 => Just(Outcome::Abort),
        ],
    )
        .prop_map(|(mutations, outcome)| GeneratedTransaction { mutations, outcome })
}

/// Strategy for generating a workload of transactions.
pub fn workload_strategy(
    min_txns: usize,
    max_txns: usize,
) -> impl Strategy<Value = Vec<GeneratedTransaction>> {
    prop::collection::vec(transaction_strategy(), min_txns..max_txns)
}

/// Ordered map the driver's DataStore must agree with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceModel {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    committed: u64,
}

impl ReferenceModel {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a committed mutation set in order.
    pub fn apply(&mut self, mutations: &[Mutation]) {
        for mutation in mutations {
            match mutation {
                Mutation::Put { key, value } => {
                    self.entries.insert(key.clone(), value.clone());
                }
                Mutation::Delete { key } => {
                    self.entries.remove(key);
                }
            }
        }
        self.committed += 1;
    }

    /// Live entries in key order.
    #[must_use]
    pub fn entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of committed transactions applied.
    #[must_use]
    pub fn committed(&self) -> u64 {
        self.committed
    }
}

/// Runs a workload against a driver and mirrors it into `model`.
///
/// # Errors
///
/// Returns the first error from staging, preparing, committing or
/// aborting.
pub fn run_workload(
    driver: &PersistenceDriver,
    workload: &[GeneratedTransaction],
    model: &mut ReferenceModel,
) -> CoreResult<()> {
    for generated in workload {
        let mut txn = driver.begin();
        for mutation in &generated.mutations {
            match mutation {
                Mutation::Put { key, value } => driver.stage(&mut txn, key, value)?,
                Mutation::Delete { key } => driver.stage_delete(&mut txn, key)?,
            }
        }
        match generated.outcome {
            Outcome::Commit => {
                driver.commit(&mut txn)?;
                model.apply(&generated.mutations);
            }
            Outcome::PrepareCommit => {
                driver.prepare(&mut txn)?;
                driver.commit(&mut txn)?;
                model.apply(&generated.mutations);
            }
            Outcome::Abort => driver.abort(&mut txn)?,
        }
    }
    Ok(())
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
