use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};

use hub_store::{Context, StoreKey};
use hub_types::{AccAddress, Coin, Coins, ConsAddress, Ratio, ValAddress, ValidatorUpdate};

use super::{
    BondStatus, Delegation, StakeGenesis, StakeParams, UnbondingDelegation, Validator,
    CODE_BAD_DENOM, CODE_INSUFFICIENT_SHARES, CODE_NO_DELEGATION, CODE_NO_VALIDATOR,
    CODE_PUBKEY_IN_USE, CODE_VALIDATOR_EXISTS, PARAMS_KEY,
};
use crate::bank::BankKeeper;
use crate::error::{codespace, ModuleError, ModuleResult};
use crate::hooks::StakingHooks;
use crate::keeper::Keeper;
use crate::params::Subspace;

const VALIDATOR_PREFIX: &[u8] = b"val/";
const CONS_INDEX_PREFIX: &[u8] = b"valcons/";
const DELEGATION_PREFIX: &[u8] = b"del/";
const UNBONDING_PREFIX: &[u8] = b"ubd/";
const LAST_POWER_PREFIX: &[u8] = b"lastpower/";

fn validator_key(op: &ValAddress) -> Vec<u8> {
    [VALIDATOR_PREFIX, op.as_bytes().as_slice()].concat()
}

fn cons_index_key(cons: &ConsAddress) -> Vec<u8> {
    [CONS_INDEX_PREFIX, cons.as_bytes().as_slice()].concat()
}

fn delegation_key(del: &AccAddress, val: &ValAddress) -> Vec<u8> {
    [DELEGATION_PREFIX, del.as_bytes().as_slice(), val.as_bytes().as_slice()].concat()
}

fn unbonding_key(completion_time: u64, del: &AccAddress, val: &ValAddress) -> Vec<u8> {
    [
        UNBONDING_PREFIX,
        completion_time.to_be_bytes().as_slice(),
        del.as_bytes().as_slice(),
        val.as_bytes().as_slice(),
    ]
    .concat()
}

fn last_power_key(op: &ValAddress) -> Vec<u8> {
    [LAST_POWER_PREFIX, op.as_bytes().as_slice()].concat()
}

fn stake_error(code: u32, reason: impl Into<String>) -> ModuleError {
    ModuleError::rejected(codespace::STAKE, code, reason)
}

/// Owner of validators, delegations, unbonding queue and last powers.
pub struct StakeKeeper {
    key: StoreKey,
    bank: Arc<BankKeeper>,
    params: Subspace,
    hooks: OnceLock<Arc<dyn StakingHooks>>,
}

impl StakeKeeper {
    pub fn new(key: StoreKey, bank: Arc<BankKeeper>, params: Subspace) -> Self {
        Self {
            key,
            bank,
            params,
            hooks: OnceLock::new(),
        }
    }

    /// Attach the staking hooks. Returns `false` if hooks were already set.
    pub fn set_hooks(&self, hooks: Arc<dyn StakingHooks>) -> bool {
        self.hooks.set(hooks).is_ok()
    }

    pub fn has_hooks(&self) -> bool {
        self.hooks.get().is_some()
    }

    fn hooks(&self) -> Option<&Arc<dyn StakingHooks>> {
        self.hooks.get()
    }

    pub fn params(&self, ctx: &Context<'_>) -> ModuleResult<StakeParams> {
        self.params.get_or(ctx, PARAMS_KEY, StakeParams::default())
    }

    pub fn set_params(&self, ctx: &mut Context<'_>, params: &StakeParams) -> ModuleResult<()> {
        self.params.set(ctx, PARAMS_KEY, params)
    }

    // -- validators ----------------------------------------------------------

    pub fn get_validator(&self, ctx: &Context<'_>, op: &ValAddress) -> ModuleResult<Option<Validator>> {
        Ok(ctx.get_value(&self.key, &validator_key(op))?)
    }

    pub fn set_validator(&self, ctx: &mut Context<'_>, validator: &Validator) -> ModuleResult<()> {
        ctx.set_value(&self.key, &validator_key(&validator.operator), validator)?;
        ctx.set_value(
            &self.key,
            &cons_index_key(&validator.cons_address()),
            &validator.operator,
        )?;
        Ok(())
    }

    fn remove_validator(&self, ctx: &mut Context<'_>, validator: &Validator) -> ModuleResult<()> {
        ctx.delete(&self.key, &validator_key(&validator.operator))?;
        ctx.delete(&self.key, &cons_index_key(&validator.cons_address()))?;
        Ok(())
    }

    pub fn validator_by_cons(&self, ctx: &Context<'_>, cons: &ConsAddress) -> ModuleResult<Option<Validator>> {
        match ctx.get_value::<ValAddress>(&self.key, &cons_index_key(cons))? {
            Some(op) => self.get_validator(ctx, &op),
            None => Ok(None),
        }
    }

    /// All validators in operator order.
    pub fn validators(&self, ctx: &Context<'_>) -> ModuleResult<Vec<Validator>> {
        Ok(ctx
            .scan_values::<Validator>(&self.key, VALIDATOR_PREFIX)?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    // -- delegations ---------------------------------------------------------

    pub fn get_delegation(
        &self,
        ctx: &Context<'_>,
        del: &AccAddress,
        val: &ValAddress,
    ) -> ModuleResult<Option<Delegation>> {
        Ok(ctx.get_value(&self.key, &delegation_key(del, val))?)
    }

    fn set_delegation(&self, ctx: &mut Context<'_>, delegation: &Delegation) -> ModuleResult<()> {
        Ok(ctx.set_value(
            &self.key,
            &delegation_key(&delegation.delegator, &delegation.validator),
            delegation,
        )?)
    }

    pub fn delegations(&self, ctx: &Context<'_>) -> ModuleResult<Vec<Delegation>> {
        Ok(ctx
            .scan_values::<Delegation>(&self.key, DELEGATION_PREFIX)?
            .into_iter()
            .map(|(_, d)| d)
            .collect())
    }

    pub fn unbonding_delegations(&self, ctx: &Context<'_>) -> ModuleResult<Vec<UnbondingDelegation>> {
        Ok(ctx
            .scan_values::<UnbondingDelegation>(&self.key, UNBONDING_PREFIX)?
            .into_iter()
            .map(|(_, u)| u)
            .collect())
    }

    fn insert_unbonding(&self, ctx: &mut Context<'_>, ubd: &UnbondingDelegation) -> ModuleResult<()> {
        let key = unbonding_key(ubd.completion_time, &ubd.delegator, &ubd.validator);
        let merged = match ctx.get_value::<UnbondingDelegation>(&self.key, &key)? {
            Some(mut existing) => {
                existing.balance.amount += ubd.balance.amount;
                existing
            }
            None => ubd.clone(),
        };
        Ok(ctx.set_value(&self.key, &key, &merged)?)
    }

    // -- last powers ---------------------------------------------------------

    pub fn last_validator_powers(&self, ctx: &Context<'_>) -> ModuleResult<BTreeMap<ValAddress, i64>> {
        let prefix_len = LAST_POWER_PREFIX.len();
        ctx.scan_values::<i64>(&self.key, LAST_POWER_PREFIX)?
            .into_iter()
            .map(|(k, power)| {
                let bytes: [u8; hub_types::ADDRESS_LEN] = k[prefix_len..]
                    .try_into()
                    .map_err(|_| ModuleError::Corrupt("malformed last-power key".into()))?;
                Ok((ValAddress::from_bytes(bytes), power))
            })
            .collect()
    }

    /// Tokens held by validators in the last committed bonded set.
    pub fn total_bonded_tokens(&self, ctx: &Context<'_>) -> ModuleResult<u128> {
        let mut total = 0u128;
        for op in self.last_validator_powers(ctx)?.keys() {
            if let Some(v) = self.get_validator(ctx, op)? {
                total = total.saturating_add(v.tokens);
            }
        }
        Ok(total)
    }

    // -- operations ----------------------------------------------------------

    pub fn create_validator(
        &self,
        ctx: &mut Context<'_>,
        operator: ValAddress,
        pub_key: hub_types::PubKey,
        moniker: &str,
        delegator: AccAddress,
        amount: &Coin,
    ) -> ModuleResult<u128> {
        let bond_denom = self.params(ctx)?.bond_denom;
        if amount.denom != bond_denom {
            return Err(stake_error(
                CODE_BAD_DENOM,
                format!("bond denom is {bond_denom}, got {}", amount.denom),
            ));
        }
        if self.get_validator(ctx, &operator)?.is_some() {
            return Err(stake_error(
                CODE_VALIDATOR_EXISTS,
                format!("validator {operator} already exists"),
            ));
        }
        if self
            .validator_by_cons(ctx, &ConsAddress::from_pubkey(&pub_key))?
            .is_some()
        {
            return Err(stake_error(
                CODE_PUBKEY_IN_USE,
                format!("consensus key {pub_key} already in use"),
            ));
        }
        let validator = Validator::new(operator, pub_key, moniker);
        self.set_validator(ctx, &validator)?;
        if let Some(hooks) = self.hooks() {
            hooks.on_validator_created(ctx, &operator)?;
        }
        self.delegate(ctx, delegator, amount, operator)
    }

    /// Move `amount` from the delegator into the validator, returning new shares.
    pub fn delegate(
        &self,
        ctx: &mut Context<'_>,
        delegator: AccAddress,
        amount: &Coin,
        operator: ValAddress,
    ) -> ModuleResult<u128> {
        let params = self.params(ctx)?;
        if amount.denom != params.bond_denom {
            return Err(stake_error(
                CODE_BAD_DENOM,
                format!("bond denom is {}, got {}", params.bond_denom, amount.denom),
            ));
        }
        let mut validator = self.get_validator(ctx, &operator)?.ok_or_else(|| {
            stake_error(CODE_NO_VALIDATOR, format!("validator {operator} does not exist"))
        })?;

        let existing = self.get_delegation(ctx, &delegator, &operator)?;
        if let Some(hooks) = self.hooks() {
            match existing {
                Some(_) => hooks.on_delegation_shares_modified(ctx, &delegator, &operator)?,
                None => hooks.on_delegation_created(ctx, &delegator, &operator)?,
            }
        }

        self.bank
            .subtract_coins(ctx, &delegator, &Coins::new([amount.clone()]))?;
        let shares = validator.shares_for_tokens(amount.amount);
        validator.tokens += amount.amount;
        validator.delegator_shares += shares;
        self.set_validator(ctx, &validator)?;

        let mut delegation = existing.unwrap_or(Delegation {
            delegator,
            validator: operator,
            shares: 0,
        });
        delegation.shares += shares;
        self.set_delegation(ctx, &delegation)?;
        Ok(shares)
    }

    /// Withdraw `shares` into the unbonding queue; returns the completion time.
    pub fn begin_unbonding(
        &self,
        ctx: &mut Context<'_>,
        delegator: AccAddress,
        operator: ValAddress,
        shares: u128,
    ) -> ModuleResult<u64> {
        let mut delegation = self
            .get_delegation(ctx, &delegator, &operator)?
            .ok_or_else(|| stake_error(CODE_NO_DELEGATION, "no delegation for this pair"))?;
        if shares > delegation.shares {
            return Err(stake_error(
                CODE_INSUFFICIENT_SHARES,
                format!("requested {shares} shares, delegation holds {}", delegation.shares),
            ));
        }
        let mut validator = self.get_validator(ctx, &operator)?.ok_or_else(|| {
            ModuleError::Corrupt(format!("delegation to missing validator {operator}"))
        })?;

        if let Some(hooks) = self.hooks() {
            hooks.on_delegation_shares_modified(ctx, &delegator, &operator)?;
        }
        let tokens = validator.tokens_for_shares(shares);
        validator.tokens -= tokens;
        validator.delegator_shares -= shares;
        delegation.shares -= shares;

        if delegation.shares == 0 {
            ctx.delete(&self.key, &delegation_key(&delegator, &operator))?;
            if let Some(hooks) = self.hooks() {
                hooks.on_delegation_removed(ctx, &delegator, &operator)?;
            }
        } else {
            self.set_delegation(ctx, &delegation)?;
        }

        let bonded = ctx.has(&self.key, &last_power_key(&operator))?;
        if validator.delegator_shares == 0 && !bonded {
            self.remove_validator(ctx, &validator)?;
            if let Some(hooks) = self.hooks() {
                hooks.on_validator_removed(ctx, &validator.cons_address(), &operator)?;
            }
        } else {
            self.set_validator(ctx, &validator)?;
        }

        let params = self.params(ctx)?;
        let completion_time = ctx.block_time() + params.unbonding_time;
        self.insert_unbonding(
            ctx,
            &UnbondingDelegation {
                delegator,
                validator: operator,
                balance: Coin::new(params.bond_denom, tokens),
                creation_height: ctx.block_height(),
                completion_time,
            },
        )?;
        Ok(completion_time)
    }

    /// Pay out every unbonding entry whose completion time has passed.
    pub fn complete_unbondings(&self, ctx: &mut Context<'_>) -> ModuleResult<Vec<UnbondingDelegation>> {
        let now = ctx.block_time();
        let mut matured = Vec::new();
        for (key, ubd) in ctx.scan_values::<UnbondingDelegation>(&self.key, UNBONDING_PREFIX)? {
            if ubd.completion_time > now {
                break;
            }
            self.bank
                .add_coins(ctx, &ubd.delegator, &Coins::new([ubd.balance.clone()]))?;
            ctx.delete(&self.key, &key)?;
            matured.push(ubd);
        }
        Ok(matured)
    }

    /// Burn `fraction` of the validator's tokens. Returns the amount burned.
    pub fn slash(&self, ctx: &mut Context<'_>, cons: &ConsAddress, fraction: Ratio) -> ModuleResult<u128> {
        let Some(mut validator) = self.validator_by_cons(ctx, cons)? else {
            tracing::warn!(validator = %cons, "slash target not found");
            return Ok(0);
        };
        let burned = fraction.mul_floor(validator.tokens).min(validator.tokens);
        validator.tokens -= burned;
        self.set_validator(ctx, &validator)?;
        tracing::info!(validator = %validator.operator, burned = %burned, "validator slashed");
        Ok(burned)
    }

    pub fn jail(&self, ctx: &mut Context<'_>, cons: &ConsAddress) -> ModuleResult<()> {
        self.set_jailed(ctx, cons, true)
    }

    pub fn unjail(&self, ctx: &mut Context<'_>, cons: &ConsAddress) -> ModuleResult<()> {
        self.set_jailed(ctx, cons, false)
    }

    fn set_jailed(&self, ctx: &mut Context<'_>, cons: &ConsAddress, jailed: bool) -> ModuleResult<()> {
        let mut validator = self
            .validator_by_cons(ctx, cons)?
            .ok_or_else(|| stake_error(CODE_NO_VALIDATOR, format!("no validator for {cons}")))?;
        validator.jailed = jailed;
        self.set_validator(ctx, &validator)
    }

    /// Recompute the bonded set and return the changes since the last call.
    ///
    /// Candidates are ordered by power descending, then operator address,
    /// and truncated to `max_validators`.
    pub fn apply_and_return_validator_set_updates(
        &self,
        ctx: &mut Context<'_>,
    ) -> ModuleResult<Vec<ValidatorUpdate>> {
        let params = self.params(ctx)?;
        let mut candidates: Vec<Validator> = self
            .validators(ctx)?
            .into_iter()
            .filter(|v| v.power() > 0)
            .collect();
        candidates.sort_by(|a, b| b.power().cmp(&a.power()).then(a.operator.cmp(&b.operator)));
        candidates.truncate(params.max_validators as usize);

        let last = self.last_validator_powers(ctx)?;
        let mut next = BTreeSet::new();
        let mut updates = Vec::new();

        for mut validator in candidates {
            let power = validator.power();
            let op = validator.operator;
            next.insert(op);
            match last.get(&op) {
                Some(&previous) if previous == power => {}
                Some(_) => {
                    ctx.set_value(&self.key, &last_power_key(&op), &power)?;
                    updates.push(ValidatorUpdate::new(validator.cons_pubkey, power));
                    if let Some(hooks) = self.hooks() {
                        hooks.on_validator_power_changed(ctx, &validator.cons_address(), &op)?;
                    }
                }
                None => {
                    validator.status = BondStatus::Bonded;
                    self.set_validator(ctx, &validator)?;
                    ctx.set_value(&self.key, &last_power_key(&op), &power)?;
                    updates.push(ValidatorUpdate::new(validator.cons_pubkey, power));
                    if let Some(hooks) = self.hooks() {
                        hooks.on_validator_bonded(ctx, &validator.cons_address(), &op)?;
                    }
                }
            }
        }

        for op in last.keys().filter(|op| !next.contains(*op)) {
            ctx.delete(&self.key, &last_power_key(op))?;
            let Some(mut validator) = self.get_validator(ctx, op)? else {
                continue;
            };
            validator.status = BondStatus::Unbonded;
            self.set_validator(ctx, &validator)?;
            updates.push(ValidatorUpdate::new(validator.cons_pubkey, 0));
            if let Some(hooks) = self.hooks() {
                hooks.on_validator_begin_unbonding(ctx, &validator.cons_address(), op)?;
            }
        }

        if !updates.is_empty() {
            tracing::debug!(updates = updates.len(), "validator set changed");
        }
        Ok(updates)
    }
}

impl std::fmt::Debug for StakeKeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StakeKeeper")
            .field("key", &self.key)
            .field("has_hooks", &self.has_hooks())
            .finish()
    }
}

impl Keeper for StakeKeeper {
    type Genesis = StakeGenesis;

    fn module_name(&self) -> &'static str {
        "stake"
    }

    fn init_genesis(&self, ctx: &mut Context<'_>, state: &StakeGenesis) -> ModuleResult<()> {
        self.set_params(ctx, &state.params)?;
        for validator in &state.validators {
            self.set_validator(ctx, validator)?;
        }
        for delegation in &state.delegations {
            self.set_delegation(ctx, delegation)?;
        }
        for ubd in &state.unbonding_delegations {
            self.insert_unbonding(ctx, ubd)?;
        }
        Ok(())
    }

    fn export_genesis(&self, ctx: &Context<'_>) -> ModuleResult<StakeGenesis> {
        Ok(StakeGenesis {
            params: self.params(ctx)?,
            validators: self.validators(ctx)?,
            delegations: self.delegations(ctx)?,
            unbonding_delegations: self.unbonding_delegations(ctx)?,
        })
    }
}
