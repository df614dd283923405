use hub_store::Context;
use hub_types::{AccAddress, ConsAddress, ValAddress};

use crate::error::ModuleResult;

/// Staking lifecycle notifications.
///
/// Every method defaults to a no-op so subscribers implement only the
/// events they care about.
pub trait StakingHooks: Send + Sync {
    fn name(&self) -> &str;

    fn on_validator_created(&self, _ctx: &mut Context<'_>, _val: &ValAddress) -> ModuleResult<()> {
        Ok(())
    }

    fn on_validator_modified(&self, _ctx: &mut Context<'_>, _val: &ValAddress) -> ModuleResult<()> {
        Ok(())
    }

    fn on_validator_removed(
        &self,
        _ctx: &mut Context<'_>,
        _cons: &ConsAddress,
        _val: &ValAddress,
    ) -> ModuleResult<()> {
        Ok(())
    }

    fn on_validator_bonded(
        &self,
        _ctx: &mut Context<'_>,
        _cons: &ConsAddress,
        _val: &ValAddress,
    ) -> ModuleResult<()> {
        Ok(())
    }

    fn on_validator_power_changed(
        &self,
        _ctx: &mut Context<'_>,
        _cons: &ConsAddress,
        _val: &ValAddress,
    ) -> ModuleResult<()> {
        Ok(())
    }

    fn on_validator_begin_unbonding(
        &self,
        _ctx: &mut Context<'_>,
        _cons: &ConsAddress,
        _val: &ValAddress,
    ) -> ModuleResult<()> {
        Ok(())
    }

    fn on_delegation_created(
        &self,
        _ctx: &mut Context<'_>,
        _del: &AccAddress,
        _val: &ValAddress,
    ) -> ModuleResult<()> {
        Ok(())
    }

    fn on_delegation_shares_modified(
        &self,
        _ctx: &mut Context<'_>,
        _del: &AccAddress,
        _val: &ValAddress,
    ) -> ModuleResult<()> {
        Ok(())
    }

    fn on_delegation_removed(
        &self,
        _ctx: &mut Context<'_>,
        _del: &AccAddress,
        _val: &ValAddress,
    ) -> ModuleResult<()> {
        Ok(())
    }
}
