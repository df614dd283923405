//! Block provisions.
//!
//! Each block mints `inflation * bonded tokens / blocks_per_year` of the mint
//! denomination into the fee collection pool, where distribution picks it up
//! with the next allocation.

use std::sync::Arc;

use hub_store::{Context, StoreKey};
use hub_types::tags::keys;
use hub_types::{mul_div_floor, Coins, Ratio, Tags};
use serde::{Deserialize, Serialize};

use crate::auth::FeeCollectionKeeper;
use crate::error::{codespace, ModuleError, ModuleResult};
use crate::keeper::{Keeper, ValidateGenesis};
use crate::params::Subspace;
use crate::stake::StakeKeeper;

pub const PARAM_SPACE: &str = "mint";
pub const PARAMS_KEY: &str = "params";

pub const CODE_INVALID_PARAMS: u32 = 100;

const MINTER_KEY: &[u8] = b"minter";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintParams {
    /// Annual inflation applied to bonded tokens.
    pub inflation: Ratio,
    pub blocks_per_year: u64,
    pub mint_denom: String,
}

impl Default for MintParams {
    fn default() -> Self {
        Self {
            inflation: Ratio::new(4, 100),
            blocks_per_year: 6_311_520,
            mint_denom: crate::auth::DEFAULT_FEE_TOKEN.to_string(),
        }
    }
}

impl MintParams {
    pub fn validate(&self) -> Result<(), String> {
        self.inflation.validate().map_err(|e| e.to_string())?;
        if self.blocks_per_year == 0 {
            return Err("blocks_per_year must be positive".into());
        }
        hub_types::validate_denom(&self.mint_denom).map_err(|e| e.to_string())
    }
}

/// Running mint totals.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Minter {
    pub last_provision: u128,
    pub total_minted: u128,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintGenesis {
    pub params: MintParams,
    pub minter: Minter,
}

impl ValidateGenesis for MintGenesis {
    fn validate(&self) -> ModuleResult<()> {
        self.params
            .validate()
            .map_err(|e| ModuleError::rejected(codespace::MINT, CODE_INVALID_PARAMS, e))
    }
}

pub struct MintKeeper {
    key: StoreKey,
    stake: Arc<StakeKeeper>,
    fees: Arc<FeeCollectionKeeper>,
    params: Subspace,
}

impl MintKeeper {
    pub fn new(key: StoreKey, stake: Arc<StakeKeeper>, fees: Arc<FeeCollectionKeeper>, params: Subspace) -> Self {
        Self {
            key,
            stake,
            fees,
            params,
        }
    }

    pub fn params(&self, ctx: &Context<'_>) -> ModuleResult<MintParams> {
        self.params.get_or(ctx, PARAMS_KEY, MintParams::default())
    }

    pub fn minter(&self, ctx: &Context<'_>) -> ModuleResult<Minter> {
        Ok(ctx.get_value(&self.key, MINTER_KEY)?.unwrap_or_default())
    }

    /// Provision for one block at the current bonded supply.
    pub fn block_provision(&self, ctx: &Context<'_>) -> ModuleResult<u128> {
        let params = self.params(ctx)?;
        let bonded = self.stake.total_bonded_tokens(ctx)?;
        let annual = params.inflation.mul_floor(bonded);
        Ok(mul_div_floor(annual, 1, params.blocks_per_year as u128).unwrap_or(0))
    }

    /// Mint this block's provision into the fee pool.
    pub fn mint(&self, ctx: &mut Context<'_>) -> ModuleResult<u128> {
        let provision = self.block_provision(ctx)?;
        if provision == 0 {
            return Ok(0);
        }
        let denom = self.params(ctx)?.mint_denom;
        self.fees
            .add_collected_fees(ctx, &Coins::single(denom, provision))?;
        let mut minter = self.minter(ctx)?;
        minter.last_provision = provision;
        minter.total_minted = minter.total_minted.saturating_add(provision);
        ctx.set_value(&self.key, MINTER_KEY, &minter)?;
        Ok(provision)
    }
}

impl Keeper for MintKeeper {
    type Genesis = MintGenesis;

    fn module_name(&self) -> &'static str {
        "mint"
    }

    fn init_genesis(&self, ctx: &mut Context<'_>, state: &MintGenesis) -> ModuleResult<()> {
        self.params.set(ctx, PARAMS_KEY, &state.params)?;
        Ok(ctx.set_value(&self.key, MINTER_KEY, &state.minter)?)
    }

    fn export_genesis(&self, ctx: &Context<'_>) -> ModuleResult<MintGenesis> {
        Ok(MintGenesis {
            params: self.params(ctx)?,
            minter: self.minter(ctx)?,
        })
    }
}

pub fn begin_blocker(ctx: &mut Context<'_>, keeper: &MintKeeper) -> ModuleResult<Tags> {
    let minted = keeper.mint(ctx)?;
    if minted == 0 {
        return Ok(Tags::new());
    }
    tracing::trace!(minted = %minted, height = ctx.block_height(), "block provision minted");
    Ok(Tags::new().with(keys::MODULE, "mint").with("minted", minted))
}

#[cfg(test)]
mod tests {
    use hub_store::{CommitMultiStore, StoreKeyRegistry};
    use hub_types::{AccAddress, BlockHeader, Coin, PubKey};

    use super::*;
    use crate::auth::AccountKeeper;
    use crate::bank::BankKeeper;
    use crate::params::ParamsKeeper;
    use crate::stake::POWER_REDUCTION;

    #[test]
    fn provision_follows_bonded_tokens() {
        let mut keys = StoreKeyRegistry::new();
        let acc = keys.register("acc").unwrap();
        let fee = keys.register("fee").unwrap();
        let params = keys.register("params").unwrap();
        let tparams = keys.register_transient("transient_params").unwrap();
        let stake_key = keys.register("stake").unwrap();
        let mint_key = keys.register("mint").unwrap();
        let params_keeper = ParamsKeeper::new(params, tparams);
        let bank = Arc::new(BankKeeper::new(Arc::new(AccountKeeper::new(acc))));
        let fees = Arc::new(FeeCollectionKeeper::new(fee));
        let stake = Arc::new(StakeKeeper::new(
            stake_key,
            Arc::clone(&bank),
            params_keeper.subspace(crate::stake::PARAM_SPACE),
        ));
        let mint = MintKeeper::new(mint_key, Arc::clone(&stake), Arc::clone(&fees), params_keeper.subspace(PARAM_SPACE));

        let mut store = CommitMultiStore::mount(&keys);
        let mut ctx = Context::new(&mut store, BlockHeader::default());
        assert_eq!(mint.mint(&mut ctx).unwrap(), 0);

        let owner = AccAddress::from_pubkey(&PubKey::from_bytes([1; 32]));
        let coin = Coin::new("airis", 100 * POWER_REDUCTION);
        bank.add_coins(&mut ctx, &owner, &Coins::new([coin.clone()])).unwrap();
        stake
            .create_validator(&mut ctx, owner.into(), PubKey::from_bytes([2; 32]), "v", owner, &coin)
            .unwrap();
        stake.apply_and_return_validator_set_updates(&mut ctx).unwrap();

        let expected = 4 * POWER_REDUCTION / 6_311_520;
        let tags = begin_blocker(&mut ctx, &mint).unwrap();
        assert_eq!(tags.get("minted"), Some(expected.to_string().as_str()));
        assert_eq!(fees.collected_fees(&ctx).unwrap().amount_of("airis"), expected);
        assert_eq!(mint.minter(&ctx).unwrap().total_minted, expected);

        let exported = mint.export_genesis(&ctx).unwrap();
        mint.init_genesis(&mut ctx, &exported).unwrap();
        assert_eq!(mint.export_genesis(&ctx).unwrap(), exported);
    }
}
