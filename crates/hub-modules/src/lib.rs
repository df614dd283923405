//! Module keepers for the Hub application engine.
//!
//! Each module owns one or more store partitions and exposes a keeper, a
//! message handler, an optional querier and optional block lifecycle
//! functions. Keepers never reach into each other's stores; they call each
//! other through the keeper APIs they were constructed with.
//!
//! # Key Types
//!
//! - [`Keeper`] / [`ValidateGenesis`]: the genesis contract every module fulfils
//! - [`Msg`]: the closed set of transaction messages and their routes
//! - [`Handler`] / [`Querier`]: per-route entry points
//! - [`AnteHandler`]: signature, sequence and fee checks before dispatch
//! - [`StakingHooks`]: staking lifecycle notifications
//! - [`ParamRegistry`]: typed declarations of governed parameters
//! - [`StdTx`]: the signed transaction envelope
//! - [`ModuleError`]: user-facing and fatal errors with codespaces

pub mod ante;
pub mod arbitration;
pub mod auth;
pub mod bank;
pub mod distr;
pub mod error;
pub mod gov;
pub mod guardian;
pub mod handler;
pub mod hooks;
pub mod keeper;
pub mod mint;
pub mod msg;
pub mod params;
pub mod record;
pub mod service;
pub mod slashing;
pub mod stake;
pub mod tx;
pub mod upgrade;

pub use ante::{AnteHandler, AnteStage, FeePreprocessHandler, FeeRefundHandler};
pub use error::{codespace, ModuleError, ModuleResult};
pub use handler::{handler_fn, querier_fn, Handler, HandlerResult, Querier};
pub use hooks::StakingHooks;
pub use keeper::{Keeper, ValidateGenesis};
pub use msg::{routes, Msg};
pub use params::{ParamRegistry, ParamTable, ParamsKeeper, RegistryError, Subspace};
pub use tx::{decode_tx, encode_tx, StdFee, StdSignature, StdTx};
