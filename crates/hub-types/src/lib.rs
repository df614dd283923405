//! Foundation types for the Hub application engine.
//!
//! Every other Hub crate depends on `hub-types`.
//!
//! # Key Types
//!
//! - [`AccAddress`], [`ValAddress`], [`ConsAddress`] - 20-byte addresses derived from keys
//! - [`PubKey`] - Ed25519 public key
//! - [`Coin`] / [`Coins`] - normalized token amounts
//! - [`Ratio`] - exact fractions for rates and thresholds
//! - [`Tags`] - ordered event records
//! - [`ValidatorUpdate`] - validator-set delta entry
//! - [`ProtocolDefinition`] - `(version, reference, activation height)`
//! - [`abci`] - consensus-engine request/response records

pub mod abci;
pub mod address;
pub mod coin;
pub mod error;
pub mod protocol;
pub mod ratio;
pub mod tags;
pub mod validator;

pub use abci::BlockHeader;
pub use address::{AccAddress, ConsAddress, PubKey, ValAddress, ADDRESS_LEN};
pub use coin::{validate_denom, Coin, Coins};
pub use error::TypeError;
pub use protocol::ProtocolDefinition;
pub use ratio::{fraction_exceeds, mul_div_floor, Ratio};
pub use tags::{Tag, Tags};
pub use validator::{
    compare_validator_sets, sort_validator_updates, ValidatorSetMismatch, ValidatorUpdate,
};

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn coin_display_parse_agree(amount in 1u128..u64::MAX as u128, denom in "[a-z][a-z0-9]{2,10}") {
            let coin = Coin::new(denom, amount);
            let parsed: Coin = coin.to_string().parse().unwrap();
            prop_assert_eq!(parsed, coin);
        }

        #[test]
        fn validator_set_comparison_is_order_free(seeds in proptest::collection::btree_set(any::<u8>(), 1..8)) {
            let updates: Vec<ValidatorUpdate> = seeds
                .iter()
                .map(|s| ValidatorUpdate::new(PubKey::from_bytes([*s; 32]), *s as i64 + 1))
                .collect();
            let mut reversed = updates.clone();
            reversed.reverse();
            prop_assert!(compare_validator_sets(&updates, &reversed).is_ok());
        }
    }
}
