//! Genesis document handling.
//!
//! The on-disk document ([`GenesisFileState`]) carries account balances as
//! coin strings. It is converted to the typed [`GenesisState`] before any
//! keeper sees it; [`coordinator`] applies that state in dependency order.

pub mod coordinator;

use std::collections::BTreeSet;
use std::path::Path;

use hub_modules::arbitration::ArbitrationGenesis;
use hub_modules::auth::{AuthGenesis, FeeGenesisConfig};
use hub_modules::distr::DistrGenesis;
use hub_modules::gov::GovGenesis;
use hub_modules::guardian::GuardianGenesis;
use hub_modules::mint::MintGenesis;
use hub_modules::service::ServiceGenesis;
use hub_modules::slashing::SlashingGenesis;
use hub_modules::stake::StakeGenesis;
use hub_modules::{ModuleError, ModuleResult, StdTx, ValidateGenesis};
use hub_types::{validate_denom, AccAddress, Coin, Coins};
use serde::{Deserialize, Serialize};

use crate::error::{FatalError, FatalResult};

pub use coordinator::{BootstrapPhase, GenesisCoordinator};

/// One account as written in the genesis file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisFileAccount {
    pub address: AccAddress,
    /// Coin strings such as `"100airis"`.
    #[serde(default)]
    pub coins: Vec<String>,
    /// Declared number. Only its relative order survives import.
    #[serde(default)]
    pub account_number: u64,
    #[serde(default)]
    pub sequence_number: u64,
}

/// The genesis document as stored on disk. Missing module sections take
/// their defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisFileState {
    pub accounts: Vec<GenesisFileAccount>,
    pub auth: AuthGenesis,
    pub fee: FeeGenesisConfig,
    pub stake: StakeGenesis,
    pub mint: MintGenesis,
    pub distr: DistrGenesis,
    pub gov: GovGenesis,
    pub slashing: SlashingGenesis,
    pub service: ServiceGenesis,
    pub guardian: GuardianGenesis,
    pub arbitration: ArbitrationGenesis,
    pub gen_txs: Vec<StdTx>,
}

impl GenesisFileState {
    pub fn from_json(bytes: &[u8]) -> FatalResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| FatalError::MalformedGenesis(e.to_string()))
    }

    pub fn to_json(&self) -> FatalResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| FatalError::MalformedGenesis(e.to_string()))
    }

    pub fn load(path: &Path) -> FatalResult<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| FatalError::MalformedGenesis(format!("{}: {e}", path.display())))?;
        Self::from_json(&bytes)
    }

    pub fn save(&self, path: &Path) -> FatalResult<()> {
        std::fs::write(path, self.to_json()?)
            .map_err(|e| FatalError::MalformedGenesis(format!("{}: {e}", path.display())))
    }

    /// Parse coin strings into the typed state.
    pub fn into_state(self) -> FatalResult<GenesisState> {
        let accounts = self
            .accounts
            .into_iter()
            .map(|a| {
                let coins = a
                    .coins
                    .iter()
                    .map(|s| s.parse::<Coin>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| {
                        FatalError::MalformedGenesis(format!("account {}: {e}", a.address))
                    })?;
                Ok(GenesisAccount {
                    address: a.address,
                    coins: Coins::new(coins),
                    account_number: a.account_number,
                    sequence: a.sequence_number,
                })
            })
            .collect::<FatalResult<Vec<_>>>()?;

        Ok(GenesisState {
            accounts,
            auth: self.auth,
            fee: self.fee,
            stake: self.stake,
            mint: self.mint,
            distr: self.distr,
            gov: self.gov,
            slashing: self.slashing,
            service: self.service,
            guardian: self.guardian,
            arbitration: self.arbitration,
            gen_txs: self.gen_txs,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenesisAccount {
    pub address: AccAddress,
    pub coins: Coins,
    pub account_number: u64,
    pub sequence: u64,
}

/// Typed genesis state, one section per module.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenesisState {
    pub accounts: Vec<GenesisAccount>,
    pub auth: AuthGenesis,
    pub fee: FeeGenesisConfig,
    pub stake: StakeGenesis,
    pub mint: MintGenesis,
    pub distr: DistrGenesis,
    pub gov: GovGenesis,
    pub slashing: SlashingGenesis,
    pub service: ServiceGenesis,
    pub guardian: GuardianGenesis,
    pub arbitration: ArbitrationGenesis,
    pub gen_txs: Vec<StdTx>,
}

impl GenesisState {
    /// Chain-wide structural validation: every module section plus the
    /// account list.
    pub fn validate(&self) -> ModuleResult<()> {
        let mut seen = BTreeSet::new();
        for account in &self.accounts {
            if !seen.insert(account.address) {
                return Err(ModuleError::InvalidAddress(format!(
                    "duplicate genesis account {}",
                    account.address
                )));
            }
            account
                .coins
                .validate()
                .map_err(|e| ModuleError::InvalidCoins(e.to_string()))?;
        }
        validate_denom(&self.fee.native_fee_token)
            .map_err(|e| ModuleError::InvalidCoins(e.to_string()))?;

        self.auth.validate()?;
        self.stake.validate()?;
        self.mint.validate()?;
        self.distr.validate()?;
        self.gov.validate()?;
        self.slashing.validate()?;
        self.service.validate()?;
        self.guardian.validate()?;
        self.arbitration.validate()
    }

    /// Back to the on-disk form. Genesis transactions are not carried over:
    /// their effects are already part of the exported state.
    pub fn into_file(self) -> GenesisFileState {
        GenesisFileState {
            accounts: self
                .accounts
                .into_iter()
                .map(|a| GenesisFileAccount {
                    address: a.address,
                    coins: a.coins.iter().map(Coin::to_string).collect(),
                    account_number: a.account_number,
                    sequence_number: a.sequence,
                })
                .collect(),
            auth: self.auth,
            fee: self.fee,
            stake: self.stake,
            mint: self.mint,
            distr: self.distr,
            gov: self.gov,
            slashing: self.slashing,
            service: self.service,
            guardian: self.guardian,
            arbitration: self.arbitration,
            gen_txs: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use hub_types::PubKey;

    use super::*;

    fn addr(seed: u8) -> AccAddress {
        AccAddress::from_pubkey(&PubKey::from_bytes([seed; 32]))
    }

    #[test]
    fn missing_sections_take_defaults() {
        let json = format!(
            r#"{{"accounts":[{{"address":"{}","coins":["100airis","5stake"],"account_number":3}}]}}"#,
            addr(1)
        );
        let state = GenesisFileState::from_json(json.as_bytes())
            .unwrap()
            .into_state()
            .unwrap();
        assert_eq!(state.accounts.len(), 1);
        assert_eq!(state.accounts[0].coins.amount_of("airis"), 100);
        assert_eq!(state.accounts[0].account_number, 3);
        assert_eq!(state.gov, GovGenesis::default());
        assert!(state.validate().is_ok());
    }

    #[test]
    fn malformed_json_is_fatal() {
        let err = GenesisFileState::from_json(b"{not json").unwrap_err();
        assert!(matches!(err, FatalError::MalformedGenesis(_)));
    }

    #[test]
    fn bad_coin_string_is_fatal() {
        let file = GenesisFileState {
            accounts: vec![GenesisFileAccount {
                address: addr(1),
                coins: vec!["airis".into()],
                account_number: 0,
                sequence_number: 0,
            }],
            ..GenesisFileState::default()
        };
        assert!(matches!(
            file.into_state(),
            Err(FatalError::MalformedGenesis(_))
        ));
    }

    #[test]
    fn duplicate_accounts_fail_validation() {
        let account = GenesisAccount {
            address: addr(7),
            coins: Coins::empty(),
            account_number: 0,
            sequence: 0,
        };
        let state = GenesisState {
            accounts: vec![account.clone(), account],
            ..GenesisState::default()
        };
        assert!(matches!(
            state.validate(),
            Err(ModuleError::InvalidAddress(_))
        ));
    }

    #[test]
    fn file_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis.json");
        let file = GenesisFileState {
            accounts: vec![GenesisFileAccount {
                address: addr(2),
                coins: vec!["42airis".into()],
                account_number: 9,
                sequence_number: 1,
            }],
            ..GenesisFileState::default()
        };
        file.save(&path).unwrap();
        let loaded = GenesisFileState::load(&path).unwrap();
        assert_eq!(loaded, file);
        assert_eq!(loaded.into_state().unwrap().into_file(), file);
    }
}
