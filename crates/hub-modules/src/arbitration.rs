//! Arbitration time limits.
//!
//! Both values live in the `gov` parameter subspace. They are declared in the
//! gov parameter table but are not changeable by proposal.

use hub_store::Context;
use serde::{Deserialize, Serialize};

use crate::error::{codespace, ModuleError, ModuleResult};
use crate::keeper::{Keeper, ValidateGenesis};
use crate::params::Subspace;

pub const COMPLAINT_RETROSPECT_KEY: &str = "complaintRetrospect";
pub const ARBITRATION_TIMELIMIT_KEY: &str = "arbitrationTimelimit";

const DAY: u64 = 24 * 60 * 60;
pub const DEFAULT_COMPLAINT_RETROSPECT: u64 = 15 * DAY;
pub const DEFAULT_ARBITRATION_TIMELIMIT: u64 = 5 * DAY;

pub const CODE_INVALID_GENESIS: u32 = 120;

/// Durations in seconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrationGenesis {
    pub complaint_retrospect: u64,
    pub arbitration_timelimit: u64,
}

impl Default for ArbitrationGenesis {
    fn default() -> Self {
        Self {
            complaint_retrospect: DEFAULT_COMPLAINT_RETROSPECT,
            arbitration_timelimit: DEFAULT_ARBITRATION_TIMELIMIT,
        }
    }
}

impl ValidateGenesis for ArbitrationGenesis {
    fn validate(&self) -> ModuleResult<()> {
        if self.complaint_retrospect == 0 || self.arbitration_timelimit == 0 {
            return Err(ModuleError::rejected(
                codespace::GOV,
                CODE_INVALID_GENESIS,
                "arbitration durations must be positive",
            ));
        }
        Ok(())
    }
}

pub struct ArbitrationKeeper {
    params: Subspace,
}

impl ArbitrationKeeper {
    pub fn new(params: Subspace) -> Self {
        Self { params }
    }

    pub fn complaint_retrospect(&self, ctx: &Context<'_>) -> ModuleResult<u64> {
        self.params
            .get_or(ctx, COMPLAINT_RETROSPECT_KEY, DEFAULT_COMPLAINT_RETROSPECT)
    }

    pub fn arbitration_timelimit(&self, ctx: &Context<'_>) -> ModuleResult<u64> {
        self.params
            .get_or(ctx, ARBITRATION_TIMELIMIT_KEY, DEFAULT_ARBITRATION_TIMELIMIT)
    }
}

impl Keeper for ArbitrationKeeper {
    type Genesis = ArbitrationGenesis;

    fn module_name(&self) -> &'static str {
        "arbitration"
    }

    fn init_genesis(&self, ctx: &mut Context<'_>, state: &ArbitrationGenesis) -> ModuleResult<()> {
        self.params
            .set(ctx, COMPLAINT_RETROSPECT_KEY, &state.complaint_retrospect)?;
        self.params
            .set(ctx, ARBITRATION_TIMELIMIT_KEY, &state.arbitration_timelimit)
    }

    fn export_genesis(&self, ctx: &Context<'_>) -> ModuleResult<ArbitrationGenesis> {
        Ok(ArbitrationGenesis {
            complaint_retrospect: self.complaint_retrospect(ctx)?,
            arbitration_timelimit: self.arbitration_timelimit(ctx)?,
        })
    }
}
