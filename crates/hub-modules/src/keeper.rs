use std::fmt::Debug;

use hub_store::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ModuleResult;

/// The genesis contract every module keeper fulfils.
///
/// `export_genesis` followed by `init_genesis` on a fresh store must
/// reproduce an identical export.
pub trait Keeper: Send + Sync {
    type Genesis: Serialize + DeserializeOwned + Default + Clone + PartialEq + Debug;

    fn module_name(&self) -> &'static str;

    fn init_genesis(&self, ctx: &mut Context<'_>, state: &Self::Genesis) -> ModuleResult<()>;

    fn export_genesis(&self, ctx: &Context<'_>) -> ModuleResult<Self::Genesis>;
}

/// Stateless structural validation of a module's genesis section.
pub trait ValidateGenesis {
    fn validate(&self) -> ModuleResult<()>;
}
