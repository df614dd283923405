//! Validators, delegations and the bonded validator set.
//!
//! A validator's consensus power is its tokens divided by
//! [`POWER_REDUCTION`]; jailed validators have zero power. The bonded set is
//! recomputed at every end block and diffed against the last committed
//! powers to produce validator-set updates.

mod handler;
mod keeper;

use std::collections::BTreeSet;

use hub_types::{mul_div_floor, AccAddress, Coin, ConsAddress, PubKey, ValAddress};
use serde::{Deserialize, Serialize};

use crate::error::{codespace, ModuleError, ModuleResult};
use crate::keeper::ValidateGenesis;

pub use handler::{end_blocker, new_handler};
pub use keeper::StakeKeeper;

/// Tokens per unit of consensus power.
pub const POWER_REDUCTION: u128 = 1_000_000_000_000_000_000;
pub const PARAM_SPACE: &str = "stake";
pub const PARAMS_KEY: &str = "params";

pub const CODE_INVALID_VALIDATOR: u32 = 101;
pub const CODE_VALIDATOR_EXISTS: u32 = 102;
pub const CODE_PUBKEY_IN_USE: u32 = 103;
pub const CODE_BAD_DENOM: u32 = 104;
pub const CODE_NO_DELEGATION: u32 = 105;
pub const CODE_INSUFFICIENT_SHARES: u32 = 106;
pub const CODE_NO_VALIDATOR: u32 = 107;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeParams {
    /// Seconds before unbonded tokens are returned.
    pub unbonding_time: u64,
    pub max_validators: u16,
    pub bond_denom: String,
}

impl Default for StakeParams {
    fn default() -> Self {
        Self {
            unbonding_time: 3 * 7 * 24 * 3600,
            max_validators: 100,
            bond_denom: crate::auth::DEFAULT_FEE_TOKEN.to_string(),
        }
    }
}

impl StakeParams {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_validators == 0 {
            return Err("max_validators must be positive".into());
        }
        hub_types::validate_denom(&self.bond_denom).map_err(|e| e.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondStatus {
    Unbonded,
    Bonded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub operator: ValAddress,
    pub cons_pubkey: PubKey,
    pub moniker: String,
    pub tokens: u128,
    pub delegator_shares: u128,
    pub jailed: bool,
    pub status: BondStatus,
}

impl Validator {
    pub fn new(operator: ValAddress, cons_pubkey: PubKey, moniker: impl Into<String>) -> Self {
        Self {
            operator,
            cons_pubkey,
            moniker: moniker.into(),
            tokens: 0,
            delegator_shares: 0,
            jailed: false,
            status: BondStatus::Unbonded,
        }
    }

    pub fn cons_address(&self) -> ConsAddress {
        ConsAddress::from_pubkey(&self.cons_pubkey)
    }

    /// Consensus power; zero while jailed.
    pub fn power(&self) -> i64 {
        if self.jailed {
            return 0;
        }
        i64::try_from(self.tokens / POWER_REDUCTION).unwrap_or(i64::MAX)
    }

    pub fn is_bonded(&self) -> bool {
        self.status == BondStatus::Bonded
    }

    /// Shares issued for `amount` new tokens.
    pub fn shares_for_tokens(&self, amount: u128) -> u128 {
        if self.tokens == 0 || self.delegator_shares == 0 {
            return amount;
        }
        mul_div_floor(amount, self.delegator_shares, self.tokens).unwrap_or(u128::MAX)
    }

    /// Tokens backing `shares`.
    pub fn tokens_for_shares(&self, shares: u128) -> u128 {
        if self.delegator_shares == 0 {
            return 0;
        }
        mul_div_floor(shares, self.tokens, self.delegator_shares).unwrap_or(0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator: AccAddress,
    pub validator: ValAddress,
    pub shares: u128,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingDelegation {
    pub delegator: AccAddress,
    pub validator: ValAddress,
    pub balance: Coin,
    pub creation_height: u64,
    /// Block time after which the balance is returned.
    pub completion_time: u64,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCreateValidator {
    pub moniker: String,
    pub delegator: AccAddress,
    pub validator: ValAddress,
    pub pub_key: PubKey,
    pub amount: Coin,
}

impl MsgCreateValidator {
    pub fn validate_basic(&self) -> ModuleResult<()> {
        if ValAddress::from(self.delegator) != self.validator {
            return Err(ModuleError::InvalidAddress(
                "validator operator must be the self-delegating account".into(),
            ));
        }
        if self.moniker.trim().is_empty() || self.moniker.len() > 70 {
            return Err(ModuleError::rejected(
                codespace::STAKE,
                CODE_INVALID_VALIDATOR,
                "moniker must be 1-70 characters",
            ));
        }
        validate_amount(&self.amount)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgDelegate {
    pub delegator: AccAddress,
    pub validator: ValAddress,
    pub amount: Coin,
}

impl MsgDelegate {
    pub fn validate_basic(&self) -> ModuleResult<()> {
        validate_amount(&self.amount)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgBeginUnbonding {
    pub delegator: AccAddress,
    pub validator: ValAddress,
    pub shares: u128,
}

impl MsgBeginUnbonding {
    pub fn validate_basic(&self) -> ModuleResult<()> {
        if self.shares == 0 {
            return Err(ModuleError::rejected(
                codespace::STAKE,
                CODE_INSUFFICIENT_SHARES,
                "shares must be positive",
            ));
        }
        Ok(())
    }
}

fn validate_amount(amount: &Coin) -> ModuleResult<()> {
    hub_types::validate_denom(&amount.denom).map_err(|e| ModuleError::InvalidCoins(e.to_string()))?;
    if amount.is_zero() {
        return Err(ModuleError::InvalidCoins("amount must be positive".into()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Genesis
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeGenesis {
    pub params: StakeParams,
    pub validators: Vec<Validator>,
    pub delegations: Vec<Delegation>,
    pub unbonding_delegations: Vec<UnbondingDelegation>,
}

impl ValidateGenesis for StakeGenesis {
    fn validate(&self) -> ModuleResult<()> {
        let invalid = |reason: String| ModuleError::rejected(codespace::STAKE, CODE_INVALID_VALIDATOR, reason);
        self.params.validate().map_err(invalid)?;
        let mut operators = BTreeSet::new();
        let mut pubkeys = BTreeSet::new();
        for v in &self.validators {
            if !operators.insert(v.operator) {
                return Err(invalid(format!("duplicate validator {}", v.operator)));
            }
            if !pubkeys.insert(v.cons_pubkey) {
                return Err(invalid(format!("duplicate consensus key {}", v.cons_pubkey)));
            }
            if v.jailed && v.is_bonded() {
                return Err(invalid(format!("validator {} is bonded and jailed", v.operator)));
            }
        }
        for d in &self.delegations {
            if !operators.contains(&d.validator) {
                return Err(invalid(format!("delegation to unknown validator {}", d.validator)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_uses_reduction_and_jail() {
        let mut v = Validator::new(ValAddress::from_bytes([1; 20]), PubKey::from_bytes([1; 32]), "v");
        v.tokens = 42 * POWER_REDUCTION + 7;
        assert_eq!(v.power(), 42);
        v.jailed = true;
        assert_eq!(v.power(), 0);
    }

    #[test]
    fn shares_track_slashed_tokens() {
        let mut v = Validator::new(ValAddress::from_bytes([1; 20]), PubKey::from_bytes([1; 32]), "v");
        assert_eq!(v.shares_for_tokens(100 * POWER_REDUCTION), 100 * POWER_REDUCTION);
        v.tokens = 50 * POWER_REDUCTION;
        v.delegator_shares = 100 * POWER_REDUCTION;
        assert_eq!(v.shares_for_tokens(POWER_REDUCTION), 2 * POWER_REDUCTION);
        assert_eq!(v.tokens_for_shares(2 * POWER_REDUCTION), POWER_REDUCTION);
    }

    #[test]
    fn genesis_rejects_duplicate_operator() {
        let v = Validator::new(ValAddress::from_bytes([1; 20]), PubKey::from_bytes([1; 32]), "v");
        let mut w = v.clone();
        w.cons_pubkey = PubKey::from_bytes([2; 32]);
        let genesis = StakeGenesis {
            validators: vec![v, w],
            ..StakeGenesis::default()
        };
        assert!(genesis.validate().is_err());
    }
}
