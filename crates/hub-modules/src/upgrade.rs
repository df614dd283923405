//! Upgrade signalling parameters held in the `sig` subspace.

use hub_store::Context;

use crate::error::ModuleResult;
use crate::params::{any_value, ParamTable, Subspace};

pub const PARAM_SPACE: &str = "sig";

pub const CURRENT_UPGRADE_PROPOSAL_ID_KEY: &str = "currentUpgradeProposalId";
pub const PROPOSAL_ACCEPT_HEIGHT_KEY: &str = "proposalAcceptHeight";
pub const SWITCH_PERIOD_KEY: &str = "switchPeriod";

/// The `sig` table. Upgrade signalling is not changeable by parameter
/// proposal.
pub fn param_table() -> ParamTable {
    ParamTable::new(PARAM_SPACE)
        .param::<u64>(CURRENT_UPGRADE_PROPOSAL_ID_KEY, false, any_value)
        .param::<u64>(PROPOSAL_ACCEPT_HEIGHT_KEY, false, any_value)
        .param::<u64>(SWITCH_PERIOD_KEY, false, any_value)
}

#[derive(Clone, Debug)]
pub struct UpgradeKeeper {
    params: Subspace,
}

impl UpgradeKeeper {
    pub fn new(params: Subspace) -> Self {
        Self { params }
    }

    /// Zero all three parameters. Runs once at chain initialization.
    pub fn init_defaults(&self, ctx: &mut Context<'_>) -> ModuleResult<()> {
        self.set_current_proposal_id(ctx, 0)?;
        self.set_proposal_accept_height(ctx, 0)?;
        self.set_switch_period(ctx, 0)
    }

    pub fn current_proposal_id(&self, ctx: &Context<'_>) -> ModuleResult<u64> {
        self.params.get_or(ctx, CURRENT_UPGRADE_PROPOSAL_ID_KEY, 0)
    }

    pub fn set_current_proposal_id(&self, ctx: &mut Context<'_>, id: u64) -> ModuleResult<()> {
        self.params.set(ctx, CURRENT_UPGRADE_PROPOSAL_ID_KEY, &id)
    }

    pub fn proposal_accept_height(&self, ctx: &Context<'_>) -> ModuleResult<u64> {
        self.params.get_or(ctx, PROPOSAL_ACCEPT_HEIGHT_KEY, 0)
    }

    pub fn set_proposal_accept_height(&self, ctx: &mut Context<'_>, height: u64) -> ModuleResult<()> {
        self.params.set(ctx, PROPOSAL_ACCEPT_HEIGHT_KEY, &height)
    }

    pub fn switch_period(&self, ctx: &Context<'_>) -> ModuleResult<u64> {
        self.params.get_or(ctx, SWITCH_PERIOD_KEY, 0)
    }

    pub fn set_switch_period(&self, ctx: &mut Context<'_>, period: u64) -> ModuleResult<()> {
        self.params.set(ctx, SWITCH_PERIOD_KEY, &period)
    }
}

#[cfg(test)]
mod tests {
    use hub_store::{CommitMultiStore, StoreKeyRegistry};
    use hub_types::BlockHeader;

    use super::*;
    use crate::params::{ParamRegistry, ParamsKeeper};

    #[test]
    fn defaults_are_written_and_readable() {
        let mut keys = StoreKeyRegistry::new();
        let params = keys.register("params").unwrap();
        let tparams = keys.register_transient("transient_params").unwrap();
        let keeper = UpgradeKeeper::new(ParamsKeeper::new(params, tparams).subspace(PARAM_SPACE));
        let mut store = CommitMultiStore::mount(&keys);
        let mut ctx = Context::new(&mut store, BlockHeader::default());

        keeper.init_defaults(&mut ctx).unwrap();
        assert!(keeper.params.has_changed(&ctx, SWITCH_PERIOD_KEY).unwrap());
        keeper.set_proposal_accept_height(&mut ctx, 42).unwrap();
        assert_eq!(keeper.proposal_accept_height(&ctx).unwrap(), 42);
        assert_eq!(keeper.current_proposal_id(&ctx).unwrap(), 0);
    }

    #[test]
    fn sig_params_are_not_gov_changeable() {
        let registry = ParamRegistry::new();
        registry.register(param_table()).unwrap();
        assert!(registry.is_registered(PARAM_SPACE));
        assert!(registry.gov_changeable().is_empty());
        assert!(registry.validate_change(PARAM_SPACE, SWITCH_PERIOD_KEY, "10").is_err());
    }
}
