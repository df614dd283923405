use std::sync::Arc;

use hub_modules::{ModuleError, ModuleResult, StakingHooks};
use hub_store::Context;
use hub_types::{AccAddress, ConsAddress, ValAddress};

/// Fans every staking event out to its subscribers in construction order.
///
/// The first failing subscriber stops the fan-out. Its error is returned as a
/// fatal [`ModuleError::Hook`]; out-of-gas passes through unchanged so the
/// enclosing transaction fails as a user error.
pub struct StakingHookChain {
    hooks: Vec<Arc<dyn StakingHooks>>,
}

impl StakingHookChain {
    pub fn new(hooks: Vec<Arc<dyn StakingHooks>>) -> Self {
        Self { hooks }
    }

    pub fn names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    fn dispatch<F>(&self, event: &str, mut f: F) -> ModuleResult<()>
    where
        F: FnMut(&dyn StakingHooks) -> ModuleResult<()>,
    {
        for hook in &self.hooks {
            if let Err(err) = f(hook.as_ref()) {
                if matches!(err, ModuleError::OutOfGas { .. }) {
                    return Err(err);
                }
                tracing::error!(hook = hook.name(), event, error = %err, "staking hook failed");
                return Err(ModuleError::Hook {
                    hook: format!("{}:{event}", hook.name()),
                    reason: err.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for StakingHookChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StakingHookChain")
            .field("hooks", &self.names())
            .finish()
    }
}

impl StakingHooks for StakingHookChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn on_validator_created(&self, ctx: &mut Context<'_>, val: &ValAddress) -> ModuleResult<()> {
        self.dispatch("validator_created", |h| h.on_validator_created(ctx, val))
    }

    fn on_validator_modified(&self, ctx: &mut Context<'_>, val: &ValAddress) -> ModuleResult<()> {
        self.dispatch("validator_modified", |h| h.on_validator_modified(ctx, val))
    }

    fn on_validator_removed(&self, ctx: &mut Context<'_>, cons: &ConsAddress, val: &ValAddress) -> ModuleResult<()> {
        self.dispatch("validator_removed", |h| h.on_validator_removed(ctx, cons, val))
    }

    fn on_validator_bonded(&self, ctx: &mut Context<'_>, cons: &ConsAddress, val: &ValAddress) -> ModuleResult<()> {
        self.dispatch("validator_bonded", |h| h.on_validator_bonded(ctx, cons, val))
    }

    fn on_validator_power_changed(
        &self,
        ctx: &mut Context<'_>,
        cons: &ConsAddress,
        val: &ValAddress,
    ) -> ModuleResult<()> {
        self.dispatch("validator_power_changed", |h| {
            h.on_validator_power_changed(ctx, cons, val)
        })
    }

    fn on_validator_begin_unbonding(
        &self,
        ctx: &mut Context<'_>,
        cons: &ConsAddress,
        val: &ValAddress,
    ) -> ModuleResult<()> {
        self.dispatch("validator_begin_unbonding", |h| {
            h.on_validator_begin_unbonding(ctx, cons, val)
        })
    }

    fn on_delegation_created(&self, ctx: &mut Context<'_>, del: &AccAddress, val: &ValAddress) -> ModuleResult<()> {
        self.dispatch("delegation_created", |h| h.on_delegation_created(ctx, del, val))
    }

    fn on_delegation_shares_modified(
        &self,
        ctx: &mut Context<'_>,
        del: &AccAddress,
        val: &ValAddress,
    ) -> ModuleResult<()> {
        self.dispatch("delegation_shares_modified", |h| {
            h.on_delegation_shares_modified(ctx, del, val)
        })
    }

    fn on_delegation_removed(&self, ctx: &mut Context<'_>, del: &AccAddress, val: &ValAddress) -> ModuleResult<()> {
        self.dispatch("delegation_removed", |h| h.on_delegation_removed(ctx, del, val))
    }
}
