//! Fee distribution.
//!
//! Fees collected in a block are allocated at the next begin block: the
//! previous proposer receives a base plus a participation-weighted bonus, the
//! community pool takes the tax, and the remainder is split across the
//! validators of the last commit by voting power. Rewards accrue to the
//! validator operator and are withdrawn with [`MsgWithdrawValidatorRewards`].

use std::sync::Arc;

use hub_store::{Context, StoreKey};
use hub_types::abci::RequestBeginBlock;
use hub_types::tags::keys;
use hub_types::{mul_div_floor, AccAddress, Coin, Coins, ConsAddress, Ratio, Tags, ValAddress};
use serde::{Deserialize, Serialize};

use crate::auth::FeeCollectionKeeper;
use crate::bank::BankKeeper;
use crate::error::{codespace, ModuleError, ModuleResult};
use crate::handler::{handler_fn, json_response, querier_fn, Handler, HandlerResult, Querier};
use crate::hooks::StakingHooks;
use crate::keeper::{Keeper, ValidateGenesis};
use crate::msg::Msg;
use crate::params::Subspace;
use crate::stake::StakeKeeper;

pub const PARAM_SPACE: &str = "distr";
pub const PARAMS_KEY: &str = "params";

pub const CODE_INVALID_PARAMS: u32 = 100;
pub const CODE_NO_DISTRIBUTION_INFO: u32 = 101;
pub const CODE_NO_REWARDS: u32 = 102;

const COMMUNITY_POOL_KEY: &[u8] = b"communitypool";
const PREVIOUS_PROPOSER_KEY: &[u8] = b"proposer";
const REWARDS_PREFIX: &[u8] = b"vrew/";
const STARTING_INFO_PREFIX: &[u8] = b"dsi/";

fn rewards_key(val: &ValAddress) -> Vec<u8> {
    [REWARDS_PREFIX, val.as_bytes().as_slice()].concat()
}

fn starting_info_key(del: &AccAddress, val: &ValAddress) -> Vec<u8> {
    [STARTING_INFO_PREFIX, del.as_bytes().as_slice(), val.as_bytes().as_slice()].concat()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistrParams {
    pub community_tax: Ratio,
    pub base_proposer_reward: Ratio,
    pub bonus_proposer_reward: Ratio,
}

impl Default for DistrParams {
    fn default() -> Self {
        Self {
            community_tax: Ratio::new(2, 100),
            base_proposer_reward: Ratio::new(1, 100),
            bonus_proposer_reward: Ratio::new(4, 100),
        }
    }
}

impl DistrParams {
    pub fn validate(&self) -> Result<(), String> {
        for ratio in [&self.community_tax, &self.base_proposer_reward, &self.bonus_proposer_reward] {
            ratio.validate_fraction().map_err(|e| e.to_string())?;
        }
        let (base, bonus) = (&self.base_proposer_reward, &self.bonus_proposer_reward);
        let combined = base.numerator as u128 * bonus.denominator as u128
            + bonus.numerator as u128 * base.denominator as u128;
        if combined > base.denominator as u128 * bonus.denominator as u128 {
            return Err("proposer rewards exceed one".into());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatorStartingInfo {
    pub delegator: AccAddress,
    pub validator: ValAddress,
    pub creation_height: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRewards {
    pub validator: ValAddress,
    pub rewards: Coins,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistrGenesis {
    pub params: DistrParams,
    pub community_pool: Coins,
    pub validator_rewards: Vec<ValidatorRewards>,
    pub delegator_starting_infos: Vec<DelegatorStartingInfo>,
    pub previous_proposer: Option<ConsAddress>,
}

impl ValidateGenesis for DistrGenesis {
    fn validate(&self) -> ModuleResult<()> {
        self.params
            .validate()
            .map_err(|e| ModuleError::rejected(codespace::DISTR, CODE_INVALID_PARAMS, e))?;
        self.community_pool
            .validate()
            .map_err(|e| ModuleError::InvalidCoins(e.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgWithdrawValidatorRewards {
    pub validator: ValAddress,
}

/// `floor(coins * num / den)` per denomination.
fn scale(coins: &Coins, num: u128, den: u128) -> Coins {
    if den == 0 {
        return Coins::empty();
    }
    Coins::new(
        coins
            .iter()
            .map(|c| Coin::new(c.denom.clone(), mul_div_floor(c.amount, num, den).unwrap_or(0))),
    )
}

fn scale_ratio(coins: &Coins, ratio: &Ratio) -> Coins {
    scale(coins, ratio.numerator as u128, ratio.denominator as u128)
}

pub struct DistrKeeper {
    key: StoreKey,
    bank: Arc<BankKeeper>,
    stake: Arc<StakeKeeper>,
    fees: Arc<FeeCollectionKeeper>,
    params: Subspace,
}

impl DistrKeeper {
    pub fn new(
        key: StoreKey,
        bank: Arc<BankKeeper>,
        stake: Arc<StakeKeeper>,
        fees: Arc<FeeCollectionKeeper>,
        params: Subspace,
    ) -> Self {
        Self {
            key,
            bank,
            stake,
            fees,
            params,
        }
    }

    pub fn params(&self, ctx: &Context<'_>) -> ModuleResult<DistrParams> {
        self.params.get_or(ctx, PARAMS_KEY, DistrParams::default())
    }

    pub fn community_pool(&self, ctx: &Context<'_>) -> ModuleResult<Coins> {
        Ok(ctx.get_value(&self.key, COMMUNITY_POOL_KEY)?.unwrap_or_default())
    }

    fn add_to_community_pool(&self, ctx: &mut Context<'_>, coins: &Coins) -> ModuleResult<()> {
        if coins.is_empty() {
            return Ok(());
        }
        let pool = self.community_pool(ctx)?.plus(coins);
        Ok(ctx.set_value(&self.key, COMMUNITY_POOL_KEY, &pool)?)
    }

    pub fn validator_rewards(&self, ctx: &Context<'_>, val: &ValAddress) -> ModuleResult<Option<Coins>> {
        Ok(ctx.get_value(&self.key, &rewards_key(val))?)
    }

    fn set_validator_rewards(&self, ctx: &mut Context<'_>, val: &ValAddress, rewards: &Coins) -> ModuleResult<()> {
        Ok(ctx.set_value(&self.key, &rewards_key(val), rewards)?)
    }

    pub fn previous_proposer(&self, ctx: &Context<'_>) -> ModuleResult<Option<ConsAddress>> {
        Ok(ctx.get_value(&self.key, PREVIOUS_PROPOSER_KEY)?)
    }

    fn allocate_to_validator(&self, ctx: &mut Context<'_>, val: &ValAddress, coins: &Coins) -> ModuleResult<()> {
        let current = self.validator_rewards(ctx, val)?.unwrap_or_default();
        self.set_validator_rewards(ctx, val, &current.plus(coins))
    }

    /// Distribute the collected fee pool over the last commit.
    pub fn allocate_tokens(&self, ctx: &mut Context<'_>, req: &RequestBeginBlock) -> ModuleResult<()> {
        let fees = self.fees.collected_fees(ctx)?;
        if fees.is_empty() {
            return Ok(());
        }
        self.fees.clear_collected_fees(ctx)?;

        let votes = &req.last_commit_info.votes;
        let total_power: u128 = votes.iter().map(|v| v.power.max(0) as u128).sum();
        if total_power == 0 {
            return self.add_to_community_pool(ctx, &fees);
        }
        let signed_power: u128 = votes
            .iter()
            .filter(|v| v.signed_last_block)
            .map(|v| v.power.max(0) as u128)
            .sum();

        let params = self.params(ctx)?;
        let mut remaining = fees.clone();

        if let Some(proposer) = self.previous_proposer(ctx)? {
            if let Some(validator) = self.stake.validator_by_cons(ctx, &proposer)? {
                let base = scale_ratio(&fees, &params.base_proposer_reward);
                let bonus = scale(
                    &scale_ratio(&fees, &params.bonus_proposer_reward),
                    signed_power,
                    total_power,
                );
                let reward = base.plus(&bonus);
                self.allocate_to_validator(ctx, &validator.operator, &reward)?;
                remaining = remaining.checked_sub(&reward).unwrap_or_default();
            } else {
                tracing::warn!(proposer = %proposer, "previous proposer not found, reward goes to community pool");
            }
        }

        let tax = scale_ratio(&fees, &params.community_tax);
        let voter_pool = remaining.checked_sub(&tax).unwrap_or_default();
        for vote in votes {
            let Some(validator) = self.stake.validator_by_cons(ctx, &vote.address)? else {
                continue;
            };
            let share = scale(&voter_pool, vote.power.max(0) as u128, total_power);
            self.allocate_to_validator(ctx, &validator.operator, &share)?;
            remaining = remaining.checked_sub(&share).unwrap_or_default();
        }
        self.add_to_community_pool(ctx, &remaining)
    }

    pub fn withdraw_validator_rewards(&self, ctx: &mut Context<'_>, val: &ValAddress) -> ModuleResult<Coins> {
        let rewards = self.validator_rewards(ctx, val)?.ok_or_else(|| {
            ModuleError::rejected(
                codespace::DISTR,
                CODE_NO_DISTRIBUTION_INFO,
                format!("no distribution info for {val}"),
            )
        })?;
        if rewards.is_empty() {
            return Err(ModuleError::rejected(codespace::DISTR, CODE_NO_REWARDS, "no rewards to withdraw"));
        }
        self.bank.add_coins(ctx, &AccAddress::from(*val), &rewards)?;
        self.set_validator_rewards(ctx, val, &Coins::empty())?;
        Ok(rewards)
    }

    pub fn starting_info(
        &self,
        ctx: &Context<'_>,
        del: &AccAddress,
        val: &ValAddress,
    ) -> ModuleResult<Option<DelegatorStartingInfo>> {
        Ok(ctx.get_value(&self.key, &starting_info_key(del, val))?)
    }
}

impl StakingHooks for DistrKeeper {
    fn name(&self) -> &str {
        "distr"
    }

    fn on_validator_created(&self, ctx: &mut Context<'_>, val: &ValAddress) -> ModuleResult<()> {
        self.set_validator_rewards(ctx, val, &Coins::empty())
    }

    fn on_validator_removed(&self, ctx: &mut Context<'_>, _cons: &ConsAddress, val: &ValAddress) -> ModuleResult<()> {
        if let Some(outstanding) = self.validator_rewards(ctx, val)? {
            self.add_to_community_pool(ctx, &outstanding)?;
        }
        Ok(ctx.delete(&self.key, &rewards_key(val))?)
    }

    fn on_delegation_created(&self, ctx: &mut Context<'_>, del: &AccAddress, val: &ValAddress) -> ModuleResult<()> {
        let info = DelegatorStartingInfo {
            delegator: *del,
            validator: *val,
            creation_height: ctx.block_height(),
        };
        Ok(ctx.set_value(&self.key, &starting_info_key(del, val), &info)?)
    }

    fn on_delegation_shares_modified(
        &self,
        ctx: &mut Context<'_>,
        del: &AccAddress,
        val: &ValAddress,
    ) -> ModuleResult<()> {
        self.on_delegation_created(ctx, del, val)
    }

    fn on_delegation_removed(&self, ctx: &mut Context<'_>, del: &AccAddress, val: &ValAddress) -> ModuleResult<()> {
        Ok(ctx.delete(&self.key, &starting_info_key(del, val))?)
    }
}

impl Keeper for DistrKeeper {
    type Genesis = DistrGenesis;

    fn module_name(&self) -> &'static str {
        "distr"
    }

    fn init_genesis(&self, ctx: &mut Context<'_>, state: &DistrGenesis) -> ModuleResult<()> {
        self.params.set(ctx, PARAMS_KEY, &state.params)?;
        ctx.set_value(&self.key, COMMUNITY_POOL_KEY, &state.community_pool)?;
        for entry in &state.validator_rewards {
            self.set_validator_rewards(ctx, &entry.validator, &entry.rewards)?;
        }
        for info in &state.delegator_starting_infos {
            ctx.set_value(&self.key, &starting_info_key(&info.delegator, &info.validator), info)?;
        }
        if let Some(proposer) = &state.previous_proposer {
            ctx.set_value(&self.key, PREVIOUS_PROPOSER_KEY, proposer)?;
        }
        Ok(())
    }

    fn export_genesis(&self, ctx: &Context<'_>) -> ModuleResult<DistrGenesis> {
        let prefix_len = REWARDS_PREFIX.len();
        let validator_rewards = ctx
            .scan_values::<Coins>(&self.key, REWARDS_PREFIX)?
            .into_iter()
            .map(|(k, rewards)| {
                let bytes: [u8; hub_types::ADDRESS_LEN] = k[prefix_len..]
                    .try_into()
                    .map_err(|_| ModuleError::Corrupt("malformed rewards key".into()))?;
                Ok(ValidatorRewards {
                    validator: ValAddress::from_bytes(bytes),
                    rewards,
                })
            })
            .collect::<ModuleResult<Vec<_>>>()?;
        let delegator_starting_infos = ctx
            .scan_values::<DelegatorStartingInfo>(&self.key, STARTING_INFO_PREFIX)?
            .into_iter()
            .map(|(_, info)| info)
            .collect();
        Ok(DistrGenesis {
            params: self.params(ctx)?,
            community_pool: self.community_pool(ctx)?,
            validator_rewards,
            delegator_starting_infos,
            previous_proposer: self.previous_proposer(ctx)?,
        })
    }
}

pub fn new_handler(keeper: Arc<DistrKeeper>) -> Handler {
    handler_fn(move |ctx, msg| match msg {
        Msg::WithdrawValidatorRewards(m) => {
            let rewards = keeper.withdraw_validator_rewards(ctx, &m.validator)?;
            Ok(HandlerResult {
                tags: Tags::new().with(keys::VALIDATOR, m.validator),
                log: format!("withdrew {rewards}"),
            })
        }
        other => Err(ModuleError::UnknownRequest(format!(
            "distr cannot handle {}",
            other.kind()
        ))),
    })
}

/// Query paths: `community_pool`, `rewards/<val hex>`.
pub fn new_querier(keeper: Arc<DistrKeeper>) -> Querier {
    querier_fn(move |ctx, path, _data| match path {
        ["community_pool"] => json_response(&keeper.community_pool(ctx)?),
        ["rewards", val] => {
            let val = ValAddress::parse(val).map_err(|e| ModuleError::InvalidAddress(e.to_string()))?;
            json_response(&keeper.validator_rewards(ctx, &val)?.unwrap_or_default())
        }
        _ => Err(ModuleError::UnknownRequest(format!(
            "unknown distr query {}",
            path.join("/")
        ))),
    })
}

/// Allocate the previous block's fees, then remember this block's proposer.
pub fn begin_blocker(ctx: &mut Context<'_>, req: &RequestBeginBlock, keeper: &DistrKeeper) -> ModuleResult<Tags> {
    if ctx.block_height() > 1 {
        keeper.allocate_tokens(ctx, req)?;
    }
    if let Some(proposer) = req.header.proposer {
        ctx.set_value(&keeper.key, PREVIOUS_PROPOSER_KEY, &proposer)?;
    }
    Ok(Tags::new())
}
