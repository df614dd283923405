use serde::{Deserialize, Serialize};

use crate::address::{ConsAddress, PubKey};

/// A validator-set delta entry for the consensus engine.
///
/// Power `0` removes the validator from the consensus set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub pub_key: PubKey,
    pub power: i64,
}

impl ValidatorUpdate {
    pub fn new(pub_key: PubKey, power: i64) -> Self {
        Self { pub_key, power }
    }

    pub fn cons_address(&self) -> ConsAddress {
        ConsAddress::from_pubkey(&self.pub_key)
    }
}

/// Sort into the canonical order used for set comparison:
/// by public key bytes, then power.
pub fn sort_validator_updates(updates: &mut [ValidatorUpdate]) {
    updates.sort();
}

/// Find the first position where two update lists differ once both are sorted
/// canonically. `Ok(())` when they are set-equal.
pub fn compare_validator_sets(
    expected: &[ValidatorUpdate],
    computed: &[ValidatorUpdate],
) -> Result<(), ValidatorSetMismatch> {
    if expected.len() != computed.len() {
        return Err(ValidatorSetMismatch::Count {
            expected: expected.len(),
            computed: computed.len(),
        });
    }
    let mut expected = expected.to_vec();
    let mut computed = computed.to_vec();
    sort_validator_updates(&mut expected);
    sort_validator_updates(&mut computed);
    for (index, (want, got)) in expected.iter().zip(computed.iter()).enumerate() {
        if want != got {
            return Err(ValidatorSetMismatch::Entry {
                index,
                expected: want.clone(),
                computed: got.clone(),
            });
        }
    }
    Ok(())
}

/// Why two validator lists are not set-equal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidatorSetMismatch {
    Count {
        expected: usize,
        computed: usize,
    },
    Entry {
        index: usize,
        expected: ValidatorUpdate,
        computed: ValidatorUpdate,
    },
}

impl std::fmt::Display for ValidatorSetMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count { expected, computed } => write!(
                f,
                "len(expected validators) != len(computed validators) ({expected} != {computed})"
            ),
            Self::Entry {
                index,
                expected,
                computed,
            } => write!(
                f,
                "validators[{index}] differ: expected {}@{}, computed {}@{}",
                expected.pub_key, expected.power, computed.pub_key, computed.power
            ),
        }
    }
}

impl std::error::Error for ValidatorSetMismatch {}
