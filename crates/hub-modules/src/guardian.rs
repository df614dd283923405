//! Profilers and trustees.
//!
//! Profilers may add other guardians. The genesis document seeds the initial
//! set; afterwards only an existing profiler can extend it.

use std::sync::Arc;

use hub_store::{Context, StoreKey};
use hub_types::{AccAddress, Tags};
use serde::{Deserialize, Serialize};

use crate::error::{codespace, ModuleError, ModuleResult};
use crate::handler::{handler_fn, json_response, querier_fn, Handler, HandlerResult, Querier};
use crate::keeper::{Keeper, ValidateGenesis};
use crate::msg::Msg;

pub const CODE_INVALID_GUARDIAN: u32 = 100;
pub const CODE_NOT_PROFILER: u32 = 101;
pub const CODE_PROFILER_EXISTS: u32 = 102;
pub const CODE_TRUSTEE_EXISTS: u32 = 103;

const PROFILER_PREFIX: &[u8] = b"profilers/";
const TRUSTEE_PREFIX: &[u8] = b"trustees/";

fn profiler_key(addr: &AccAddress) -> Vec<u8> {
    [PROFILER_PREFIX, addr.as_bytes().as_slice()].concat()
}

fn trustee_key(addr: &AccAddress) -> Vec<u8> {
    [TRUSTEE_PREFIX, addr.as_bytes().as_slice()].concat()
}

fn guardian_error(code: u32, reason: impl Into<String>) -> ModuleError {
    ModuleError::rejected(codespace::GUARDIAN, code, reason)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Genesis,
    Ordinary,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guardian {
    pub description: String,
    pub account_type: AccountType,
    pub address: AccAddress,
    pub added_by: AccAddress,
}

impl Guardian {
    fn validate(&self) -> ModuleResult<()> {
        if self.description.trim().is_empty() {
            return Err(guardian_error(CODE_INVALID_GUARDIAN, "description must not be empty"));
        }
        Ok(())
    }
}

fn validate_description(description: &str) -> ModuleResult<()> {
    if description.trim().is_empty() || description.len() > 70 {
        return Err(guardian_error(CODE_INVALID_GUARDIAN, "description must be 1-70 characters"));
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAddProfiler {
    pub address: AccAddress,
    pub description: String,
    pub added_by: AccAddress,
}

impl MsgAddProfiler {
    pub fn validate_basic(&self) -> ModuleResult<()> {
        validate_description(&self.description)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAddTrustee {
    pub address: AccAddress,
    pub description: String,
    pub added_by: AccAddress,
}

impl MsgAddTrustee {
    pub fn validate_basic(&self) -> ModuleResult<()> {
        validate_description(&self.description)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianGenesis {
    pub profilers: Vec<Guardian>,
    pub trustees: Vec<Guardian>,
}

impl ValidateGenesis for GuardianGenesis {
    fn validate(&self) -> ModuleResult<()> {
        self.profilers
            .iter()
            .chain(&self.trustees)
            .try_for_each(Guardian::validate)
    }
}

#[derive(Clone, Debug)]
pub struct GuardianKeeper {
    key: StoreKey,
}

impl GuardianKeeper {
    pub fn new(key: StoreKey) -> Self {
        Self { key }
    }

    pub fn profiler(&self, ctx: &Context<'_>, addr: &AccAddress) -> ModuleResult<Option<Guardian>> {
        Ok(ctx.get_value(&self.key, &profiler_key(addr))?)
    }

    pub fn trustee(&self, ctx: &Context<'_>, addr: &AccAddress) -> ModuleResult<Option<Guardian>> {
        Ok(ctx.get_value(&self.key, &trustee_key(addr))?)
    }

    pub fn profilers(&self, ctx: &Context<'_>) -> ModuleResult<Vec<Guardian>> {
        Ok(ctx
            .scan_values::<Guardian>(&self.key, PROFILER_PREFIX)?
            .into_iter()
            .map(|(_, g)| g)
            .collect())
    }

    pub fn trustees(&self, ctx: &Context<'_>) -> ModuleResult<Vec<Guardian>> {
        Ok(ctx
            .scan_values::<Guardian>(&self.key, TRUSTEE_PREFIX)?
            .into_iter()
            .map(|(_, g)| g)
            .collect())
    }

    fn require_profiler(&self, ctx: &Context<'_>, addr: &AccAddress) -> ModuleResult<()> {
        if self.profiler(ctx, addr)?.is_none() {
            return Err(guardian_error(CODE_NOT_PROFILER, format!("{addr} is not a profiler")));
        }
        Ok(())
    }

    pub fn add_profiler(&self, ctx: &mut Context<'_>, msg: &MsgAddProfiler) -> ModuleResult<()> {
        self.require_profiler(ctx, &msg.added_by)?;
        if self.profiler(ctx, &msg.address)?.is_some() {
            return Err(guardian_error(CODE_PROFILER_EXISTS, format!("{} is already a profiler", msg.address)));
        }
        let guardian = Guardian {
            description: msg.description.clone(),
            account_type: AccountType::Ordinary,
            address: msg.address,
            added_by: msg.added_by,
        };
        Ok(ctx.set_value(&self.key, &profiler_key(&msg.address), &guardian)?)
    }

    pub fn add_trustee(&self, ctx: &mut Context<'_>, msg: &MsgAddTrustee) -> ModuleResult<()> {
        self.require_profiler(ctx, &msg.added_by)?;
        if self.trustee(ctx, &msg.address)?.is_some() {
            return Err(guardian_error(CODE_TRUSTEE_EXISTS, format!("{} is already a trustee", msg.address)));
        }
        let guardian = Guardian {
            description: msg.description.clone(),
            account_type: AccountType::Ordinary,
            address: msg.address,
            added_by: msg.added_by,
        };
        Ok(ctx.set_value(&self.key, &trustee_key(&msg.address), &guardian)?)
    }
}

impl Keeper for GuardianKeeper {
    type Genesis = GuardianGenesis;

    fn module_name(&self) -> &'static str {
        "guardian"
    }

    fn init_genesis(&self, ctx: &mut Context<'_>, state: &GuardianGenesis) -> ModuleResult<()> {
        for profiler in &state.profilers {
            ctx.set_value(&self.key, &profiler_key(&profiler.address), profiler)?;
        }
        for trustee in &state.trustees {
            ctx.set_value(&self.key, &trustee_key(&trustee.address), trustee)?;
        }
        Ok(())
    }

    fn export_genesis(&self, ctx: &Context<'_>) -> ModuleResult<GuardianGenesis> {
        Ok(GuardianGenesis {
            profilers: self.profilers(ctx)?,
            trustees: self.trustees(ctx)?,
        })
    }
}

pub fn new_handler(keeper: Arc<GuardianKeeper>) -> Handler {
    handler_fn(move |ctx, msg| match msg {
        Msg::AddProfiler(m) => {
            keeper.add_profiler(ctx, m)?;
            Ok(HandlerResult::with_tags(Tags::new().with("profiler", m.address)))
        }
        Msg::AddTrustee(m) => {
            keeper.add_trustee(ctx, m)?;
            Ok(HandlerResult::with_tags(Tags::new().with("trustee", m.address)))
        }
        other => Err(ModuleError::UnknownRequest(format!(
            "guardian cannot handle {}",
            other.kind()
        ))),
    })
}

pub fn new_querier(keeper: Arc<GuardianKeeper>) -> Querier {
    querier_fn(move |ctx, path, _data| match path {
        ["profilers"] => json_response(&keeper.profilers(ctx)?),
        ["trustees"] => json_response(&keeper.trustees(ctx)?),
        _ => Err(ModuleError::UnknownRequest(format!(
            "unknown guardian query {}",
            path.join("/")
        ))),
    })
}

#[cfg(test)]
mod tests {
    use hub_store::{CommitMultiStore, StoreKeyRegistry};
    use hub_types::{BlockHeader, PubKey};

    use super::*;

    fn addr(seed: u8) -> AccAddress {
        AccAddress::from_pubkey(&PubKey::from_bytes([seed; 32]))
    }

    #[test]
    fn only_profilers_extend_the_set() {
        let mut keys = StoreKeyRegistry::new();
        let key = keys.register("guardian").unwrap();
        let keeper = GuardianKeeper::new(key);
        let mut store = CommitMultiStore::mount(&keys);
        let mut ctx = Context::new(&mut store, BlockHeader::default());
        let genesis = GuardianGenesis {
            profilers: vec![Guardian {
                description: "genesis profiler".into(),
                account_type: AccountType::Genesis,
                address: addr(1),
                added_by: addr(1),
            }],
            trustees: Vec::new(),
        };
        genesis.validate().unwrap();
        keeper.init_genesis(&mut ctx, &genesis).unwrap();

        let by_stranger = MsgAddTrustee {
            address: addr(3),
            description: "t".into(),
            added_by: addr(2),
        };
        assert_eq!(keeper.add_trustee(&mut ctx, &by_stranger).unwrap_err().code(), CODE_NOT_PROFILER);

        let by_profiler = MsgAddTrustee {
            added_by: addr(1),
            ..by_stranger
        };
        keeper.add_trustee(&mut ctx, &by_profiler).unwrap();
        assert_eq!(keeper.add_trustee(&mut ctx, &by_profiler).unwrap_err().code(), CODE_TRUSTEE_EXISTS);

        let exported = keeper.export_genesis(&ctx).unwrap();
        assert_eq!(exported.trustees.len(), 1);
        assert_eq!(exported.profilers, genesis.profilers);
    }
}
