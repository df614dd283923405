//! Liveness tracking, double-sign evidence, and jailing.

use std::sync::Arc;

use hub_store::{Context, StoreKey};
use hub_types::abci::{EvidenceKind, RequestBeginBlock};
use hub_types::tags::keys;
use hub_types::{ConsAddress, PubKey, Ratio, Tags, ValAddress};
use serde::{Deserialize, Serialize};

use crate::error::{codespace, ModuleError, ModuleResult};
use crate::handler::{handler_fn, Handler, HandlerResult};
use crate::hooks::StakingHooks;
use crate::keeper::{Keeper, ValidateGenesis};
use crate::msg::Msg;
use crate::params::Subspace;
use crate::stake::{StakeGenesis, StakeKeeper};

pub const PARAM_SPACE: &str = "slashing";
pub const PARAMS_KEY: &str = "params";

pub const CODE_INVALID_PARAMS: u32 = 100;
pub const CODE_NO_VALIDATOR: u32 = 101;
pub const CODE_NOT_JAILED: u32 = 102;
pub const CODE_STILL_JAILED: u32 = 103;
pub const CODE_NO_SIGNING_INFO: u32 = 104;

const PUBKEY_PREFIX: &[u8] = b"pubkey/";
const INFO_PREFIX: &[u8] = b"info/";
const MISSED_PREFIX: &[u8] = b"missed/";

fn pubkey_key(cons: &ConsAddress) -> Vec<u8> {
    [PUBKEY_PREFIX, cons.as_bytes().as_slice()].concat()
}

fn info_key(cons: &ConsAddress) -> Vec<u8> {
    [INFO_PREFIX, cons.as_bytes().as_slice()].concat()
}

fn missed_prefix(cons: &ConsAddress) -> Vec<u8> {
    [MISSED_PREFIX, cons.as_bytes().as_slice(), b"/"].concat()
}

fn missed_key(cons: &ConsAddress, index: u64) -> Vec<u8> {
    [missed_prefix(cons).as_slice(), index.to_be_bytes().as_slice()].concat()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashingParams {
    /// Seconds after which evidence is ignored.
    pub max_evidence_age: u64,
    pub signed_blocks_window: u64,
    pub min_signed_per_window: Ratio,
    /// Seconds a jailed validator must wait before unjailing.
    pub downtime_jail_duration: u64,
    pub slash_fraction_double_sign: Ratio,
    pub slash_fraction_downtime: Ratio,
}

impl Default for SlashingParams {
    fn default() -> Self {
        Self {
            max_evidence_age: 3 * 7 * 24 * 3600,
            signed_blocks_window: 100,
            min_signed_per_window: Ratio::new(1, 2),
            downtime_jail_duration: 600,
            slash_fraction_double_sign: Ratio::new(1, 20),
            slash_fraction_downtime: Ratio::new(1, 100),
        }
    }
}

impl SlashingParams {
    pub fn validate(&self) -> Result<(), String> {
        if self.signed_blocks_window == 0 {
            return Err("signed_blocks_window must be positive".into());
        }
        for ratio in [
            &self.min_signed_per_window,
            &self.slash_fraction_double_sign,
            &self.slash_fraction_downtime,
        ] {
            ratio.validate_fraction().map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSigningInfo {
    pub start_height: u64,
    pub index_offset: u64,
    pub jailed_until: u64,
    pub missed_blocks_counter: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningInfoEntry {
    pub address: ConsAddress,
    pub info: ValidatorSigningInfo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissedBlockEntry {
    pub address: ConsAddress,
    pub index: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashingGenesis {
    pub params: SlashingParams,
    pub signing_infos: Vec<SigningInfoEntry>,
    pub missed_blocks: Vec<MissedBlockEntry>,
}

impl ValidateGenesis for SlashingGenesis {
    fn validate(&self) -> ModuleResult<()> {
        self.params
            .validate()
            .map_err(|e| ModuleError::rejected(codespace::SLASHING, CODE_INVALID_PARAMS, e))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUnjail {
    pub validator: ValAddress,
}

fn slashing_error(code: u32, reason: impl Into<String>) -> ModuleError {
    ModuleError::rejected(codespace::SLASHING, code, reason)
}

pub struct SlashingKeeper {
    key: StoreKey,
    stake: Arc<StakeKeeper>,
    params: Subspace,
}

impl SlashingKeeper {
    pub fn new(key: StoreKey, stake: Arc<StakeKeeper>, params: Subspace) -> Self {
        Self { key, stake, params }
    }

    pub fn params(&self, ctx: &Context<'_>) -> ModuleResult<SlashingParams> {
        self.params.get_or(ctx, PARAMS_KEY, SlashingParams::default())
    }

    pub fn pubkey(&self, ctx: &Context<'_>, cons: &ConsAddress) -> ModuleResult<Option<PubKey>> {
        Ok(ctx.get_value(&self.key, &pubkey_key(cons))?)
    }

    pub fn add_pubkey(&self, ctx: &mut Context<'_>, key: &PubKey) -> ModuleResult<()> {
        Ok(ctx.set_value(&self.key, &pubkey_key(&ConsAddress::from_pubkey(key)), key)?)
    }

    pub fn signing_info(&self, ctx: &Context<'_>, cons: &ConsAddress) -> ModuleResult<Option<ValidatorSigningInfo>> {
        Ok(ctx.get_value(&self.key, &info_key(cons))?)
    }

    pub fn set_signing_info(
        &self,
        ctx: &mut Context<'_>,
        cons: &ConsAddress,
        info: &ValidatorSigningInfo,
    ) -> ModuleResult<()> {
        Ok(ctx.set_value(&self.key, &info_key(cons), info)?)
    }

    fn clear_missed_blocks(&self, ctx: &mut Context<'_>, cons: &ConsAddress) -> ModuleResult<()> {
        for (k, _) in ctx.prefix_scan(&self.key, &missed_prefix(cons))? {
            ctx.delete(&self.key, &k)?;
        }
        Ok(())
    }

    /// Record one vote of the last commit, jailing the validator if it has
    /// missed too many blocks in the window.
    pub fn handle_validator_signature(
        &self,
        ctx: &mut Context<'_>,
        cons: &ConsAddress,
        signed: bool,
    ) -> ModuleResult<Tags> {
        let params = self.params(ctx)?;
        let height = ctx.block_height();
        let mut info = self.signing_info(ctx, cons)?.unwrap_or(ValidatorSigningInfo {
            start_height: height,
            ..ValidatorSigningInfo::default()
        });
        let window = params.signed_blocks_window;
        let index = info.index_offset % window;
        info.index_offset += 1;

        let previously_missed = ctx.has(&self.key, &missed_key(cons, index))?;
        match (signed, previously_missed) {
            (false, false) => {
                ctx.set_value(&self.key, &missed_key(cons, index), &true)?;
                info.missed_blocks_counter += 1;
            }
            (true, true) => {
                ctx.delete(&self.key, &missed_key(cons, index))?;
                info.missed_blocks_counter -= 1;
            }
            _ => {}
        }

        let mut tags = Tags::new();
        let min_height = info.start_height + window;
        let max_missed = window - params.min_signed_per_window.mul_floor(window as u128) as u64;
        if height > min_height && info.missed_blocks_counter > max_missed {
            if let Some(validator) = self.stake.validator_by_cons(ctx, cons)? {
                if !validator.jailed {
                    self.stake.slash(ctx, cons, params.slash_fraction_downtime)?;
                    self.stake.jail(ctx, cons)?;
                    info.jailed_until = ctx.block_time() + params.downtime_jail_duration;
                    info.missed_blocks_counter = 0;
                    info.index_offset = 0;
                    self.clear_missed_blocks(ctx, cons)?;
                    tracing::info!(validator = %cons, height, "validator jailed for downtime");
                    tags.push(keys::ACTION, "slash_downtime");
                    tags.push(keys::VALIDATOR, validator.operator);
                }
            }
        }
        self.set_signing_info(ctx, cons, &info)?;
        Ok(tags)
    }

    /// Slash and jail a validator for equivocation.
    pub fn handle_double_sign(
        &self,
        ctx: &mut Context<'_>,
        cons: &ConsAddress,
        infraction_time: u64,
    ) -> ModuleResult<Tags> {
        let params = self.params(ctx)?;
        let age = ctx.block_time().saturating_sub(infraction_time);
        if age > params.max_evidence_age {
            tracing::debug!(validator = %cons, age, "ignoring stale evidence");
            return Ok(Tags::new());
        }
        let Some(validator) = self.stake.validator_by_cons(ctx, cons)? else {
            return Ok(Tags::new());
        };
        self.stake.slash(ctx, cons, params.slash_fraction_double_sign)?;
        if !validator.jailed {
            self.stake.jail(ctx, cons)?;
        }
        let mut info = self.signing_info(ctx, cons)?.unwrap_or_default();
        info.jailed_until = ctx.block_time() + params.downtime_jail_duration;
        self.set_signing_info(ctx, cons, &info)?;
        tracing::info!(validator = %cons, "validator slashed for double sign");
        Ok(Tags::new()
            .with(keys::ACTION, "slash_double_sign")
            .with(keys::VALIDATOR, validator.operator))
    }

    pub fn unjail(&self, ctx: &mut Context<'_>, operator: &ValAddress) -> ModuleResult<()> {
        let validator = self
            .stake
            .get_validator(ctx, operator)?
            .ok_or_else(|| slashing_error(CODE_NO_VALIDATOR, format!("no validator {operator}")))?;
        if !validator.jailed {
            return Err(slashing_error(CODE_NOT_JAILED, "validator is not jailed"));
        }
        let cons = validator.cons_address();
        let info = self
            .signing_info(ctx, &cons)?
            .ok_or_else(|| slashing_error(CODE_NO_SIGNING_INFO, "no signing info"))?;
        if ctx.block_time() < info.jailed_until {
            return Err(slashing_error(
                CODE_STILL_JAILED,
                format!("jailed until {}", info.jailed_until),
            ));
        }
        self.stake.unjail(ctx, &cons)
    }

    /// Register the consensus key of every validator in the stake genesis.
    pub fn register_genesis_validators(&self, ctx: &mut Context<'_>, stake: &StakeGenesis) -> ModuleResult<()> {
        for validator in &stake.validators {
            self.add_pubkey(ctx, &validator.cons_pubkey)?;
        }
        Ok(())
    }
}

impl StakingHooks for SlashingKeeper {
    fn name(&self) -> &str {
        "slashing"
    }

    fn on_validator_bonded(&self, ctx: &mut Context<'_>, cons: &ConsAddress, val: &ValAddress) -> ModuleResult<()> {
        if self.signing_info(ctx, cons)?.is_none() {
            let info = ValidatorSigningInfo {
                start_height: ctx.block_height(),
                ..ValidatorSigningInfo::default()
            };
            self.set_signing_info(ctx, cons, &info)?;
        }
        if let Some(validator) = self.stake.get_validator(ctx, val)? {
            self.add_pubkey(ctx, &validator.cons_pubkey)?;
        }
        Ok(())
    }

    fn on_validator_removed(&self, ctx: &mut Context<'_>, cons: &ConsAddress, _val: &ValAddress) -> ModuleResult<()> {
        Ok(ctx.delete(&self.key, &pubkey_key(cons))?)
    }
}

impl Keeper for SlashingKeeper {
    type Genesis = SlashingGenesis;

    fn module_name(&self) -> &'static str {
        "slashing"
    }

    fn init_genesis(&self, ctx: &mut Context<'_>, state: &SlashingGenesis) -> ModuleResult<()> {
        self.params.set(ctx, PARAMS_KEY, &state.params)?;
        for entry in &state.signing_infos {
            self.set_signing_info(ctx, &entry.address, &entry.info)?;
        }
        for entry in &state.missed_blocks {
            ctx.set_value(&self.key, &missed_key(&entry.address, entry.index), &true)?;
        }
        Ok(())
    }

    fn export_genesis(&self, ctx: &Context<'_>) -> ModuleResult<SlashingGenesis> {
        let signing_infos = ctx
            .scan_values::<ValidatorSigningInfo>(&self.key, INFO_PREFIX)?
            .into_iter()
            .map(|(k, info)| Ok(SigningInfoEntry {
                address: address_from_key(&k[INFO_PREFIX.len()..])?,
                info,
            }))
            .collect::<ModuleResult<Vec<_>>>()?;
        let missed_blocks = ctx
            .prefix_scan(&self.key, MISSED_PREFIX)?
            .into_iter()
            .map(|(k, _)| {
                let rest = &k[MISSED_PREFIX.len()..];
                let (addr, tail) = rest.split_at(hub_types::ADDRESS_LEN.min(rest.len()));
                let index: [u8; 8] = tail
                    .get(1..)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| ModuleError::Corrupt("malformed missed-block key".into()))?;
                Ok(MissedBlockEntry {
                    address: address_from_key(addr)?,
                    index: u64::from_be_bytes(index),
                })
            })
            .collect::<ModuleResult<Vec<_>>>()?;
        Ok(SlashingGenesis {
            params: self.params(ctx)?,
            signing_infos,
            missed_blocks,
        })
    }
}

fn address_from_key(bytes: &[u8]) -> ModuleResult<ConsAddress> {
    let arr: [u8; hub_types::ADDRESS_LEN] = bytes
        .try_into()
        .map_err(|_| ModuleError::Corrupt("malformed consensus address key".into()))?;
    Ok(ConsAddress::from_bytes(arr))
}

pub fn new_handler(keeper: Arc<SlashingKeeper>) -> Handler {
    handler_fn(move |ctx, msg| match msg {
        Msg::Unjail(m) => {
            keeper.unjail(ctx, &m.validator)?;
            Ok(HandlerResult::with_tags(Tags::new().with(keys::VALIDATOR, m.validator)))
        }
        other => Err(ModuleError::UnknownRequest(format!(
            "slashing cannot handle {}",
            other.kind()
        ))),
    })
}

/// Process last-commit votes, then byzantine evidence.
pub fn begin_blocker(ctx: &mut Context<'_>, req: &RequestBeginBlock, keeper: &SlashingKeeper) -> ModuleResult<Tags> {
    let mut tags = Tags::new();
    for vote in &req.last_commit_info.votes {
        tags.append(keeper.handle_validator_signature(ctx, &vote.address, vote.signed_last_block)?);
    }
    for evidence in &req.byzantine_validators {
        match evidence.kind {
            EvidenceKind::DuplicateVote => {
                tags.append(keeper.handle_double_sign(ctx, &evidence.address, evidence.time)?);
            }
        }
    }
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use hub_store::{CommitMultiStore, StoreKeyRegistry};
    use hub_types::abci::{Evidence, LastCommitInfo, VoteInfo};
    use hub_types::{AccAddress, BlockHeader, Coin, Coins};

    use super::*;
    use crate::auth::AccountKeeper;
    use crate::bank::BankKeeper;
    use crate::params::ParamsKeeper;
    use crate::stake::POWER_REDUCTION;

    struct Fixture {
        store: CommitMultiStore,
        stake: Arc<StakeKeeper>,
        slashing: Arc<SlashingKeeper>,
        operator: ValAddress,
        cons: ConsAddress,
    }

    fn fixture() -> Fixture {
        let mut keys = StoreKeyRegistry::new();
        let acc = keys.register("acc").unwrap();
        let params = keys.register("params").unwrap();
        let tparams = keys.register_transient("transient_params").unwrap();
        let stake_key = keys.register("stake").unwrap();
        let slashing_key = keys.register("slashing").unwrap();
        let params_keeper = ParamsKeeper::new(params, tparams);
        let bank = Arc::new(BankKeeper::new(Arc::new(AccountKeeper::new(acc))));
        let stake = Arc::new(StakeKeeper::new(
            stake_key,
            Arc::clone(&bank),
            params_keeper.subspace(crate::stake::PARAM_SPACE),
        ));
        let slashing = Arc::new(SlashingKeeper::new(
            slashing_key,
            Arc::clone(&stake),
            params_keeper.subspace(PARAM_SPACE),
        ));
        stake.set_hooks(slashing.clone());

        let mut store = CommitMultiStore::mount(&keys);
        let owner = AccAddress::from_pubkey(&PubKey::from_bytes([1; 32]));
        let cons_key = PubKey::from_bytes([2; 32]);
        {
            let mut ctx = Context::new(&mut store, BlockHeader::default());
            let stake_coin = Coin::new("airis", 10 * POWER_REDUCTION);
            bank.add_coins(&mut ctx, &owner, &Coins::new([stake_coin.clone()])).unwrap();
            stake
                .create_validator(&mut ctx, owner.into(), cons_key, "alpha", owner, &stake_coin)
                .unwrap();
            stake.apply_and_return_validator_set_updates(&mut ctx).unwrap();
        }
        Fixture {
            store,
            stake,
            slashing,
            operator: owner.into(),
            cons: ConsAddress::from_pubkey(&cons_key),
        }
    }

    fn block(height: u64, time: u64, cons: ConsAddress, signed: bool) -> RequestBeginBlock {
        RequestBeginBlock {
            header: BlockHeader {
                height,
                time,
                ..BlockHeader::default()
            },
            last_commit_info: LastCommitInfo {
                round: 0,
                votes: vec![VoteInfo {
                    address: cons,
                    power: 10,
                    signed_last_block: signed,
                }],
            },
            ..RequestBeginBlock::default()
        }
    }

    #[test]
    fn bonding_hook_creates_signing_info_and_pubkey() {
        let mut fx = fixture();
        let ctx = Context::new(&mut fx.store, BlockHeader::default());
        assert!(fx.slashing.signing_info(&ctx, &fx.cons).unwrap().is_some());
        assert_eq!(
            fx.slashing.pubkey(&ctx, &fx.cons).unwrap(),
            Some(PubKey::from_bytes([2; 32]))
        );
    }

    #[test]
    fn downtime_jails_after_window() {
        let mut fx = fixture();
        let mut jailed_at = None;
        for height in 1..=200u64 {
            let req = block(height, height * 5, fx.cons, false);
            let mut ctx = Context::new(&mut fx.store, req.header.clone());
            let tags = begin_blocker(&mut ctx, &req, &fx.slashing).unwrap();
            if tags.get(keys::ACTION) == Some("slash_downtime") {
                jailed_at = Some(height);
                break;
            }
        }
        assert_eq!(jailed_at, Some(101));
        let ctx = Context::new(&mut fx.store, BlockHeader::default());
        let validator = fx.stake.get_validator(&ctx, &fx.operator).unwrap().unwrap();
        assert!(validator.jailed);
        assert_eq!(validator.tokens, 10 * POWER_REDUCTION - POWER_REDUCTION / 10);
    }

    #[test]
    fn double_sign_slashes_and_unjail_waits() {
        let mut fx = fixture();
        let mut req = block(5, 1000, fx.cons, true);
        req.byzantine_validators.push(Evidence {
            kind: EvidenceKind::DuplicateVote,
            address: fx.cons,
            power: 10,
            height: 4,
            time: 995,
        });
        {
            let mut ctx = Context::new(&mut fx.store, req.header.clone());
            let tags = begin_blocker(&mut ctx, &req, &fx.slashing).unwrap();
            assert_eq!(tags.get(keys::ACTION), Some("slash_double_sign"));
            let err = fx.slashing.unjail(&mut ctx, &fx.operator).unwrap_err();
            assert_eq!(err.code(), CODE_STILL_JAILED);
        }
        let later = BlockHeader {
            height: 6,
            time: 1000 + SlashingParams::default().downtime_jail_duration,
            ..BlockHeader::default()
        };
        let mut ctx = Context::new(&mut fx.store, later);
        fx.slashing.unjail(&mut ctx, &fx.operator).unwrap();
        assert!(!fx.stake.get_validator(&ctx, &fx.operator).unwrap().unwrap().jailed);
    }

    #[test]
    fn genesis_export_round_trips() {
        let mut fx = fixture();
        let req = block(1, 5, fx.cons, false);
        let mut ctx = Context::new(&mut fx.store, req.header.clone());
        begin_blocker(&mut ctx, &req, &fx.slashing).unwrap();
        let exported = fx.slashing.export_genesis(&ctx).unwrap();
        assert_eq!(exported.missed_blocks.len(), 1);
        fx.slashing.init_genesis(&mut ctx, &exported).unwrap();
        assert_eq!(fx.slashing.export_genesis(&ctx).unwrap(), exported);
    }
}
