//! Protocol versions.
//!
//! A protocol version owns one keeper set, its routers and ante handlers, and
//! the block lifecycle callbacks. Versions are selected by activation height
//! (see [`crate::engine::ProtocolEngine`]).

pub mod v0;

use hub_modules::{AnteHandler, FeePreprocessHandler, FeeRefundHandler};
use hub_store::Context;
use hub_types::abci::{
    RequestBeginBlock, RequestEndBlock, RequestInitChain, ResponseBeginBlock, ResponseEndBlock,
    ResponseInitChain,
};
use hub_types::ProtocolDefinition;

use crate::error::{FatalResult, LoadError};
use crate::genesis::coordinator::TxDeliverer;
use crate::genesis::GenesisFileState;
use crate::router::{QueryRouter, Router};

pub use v0::ProtocolVersion0;

/// One version of the application's state machine.
pub trait Protocol: Send + Sync {
    fn definition(&self) -> &ProtocolDefinition;

    /// Build keepers, hooks, routes, handlers and parameter tables.
    /// Idempotent.
    fn load(&self) -> Result<(), LoadError>;

    /// Activation logic run once when this version takes over.
    fn init(&self, ctx: &mut Context<'_>) -> FatalResult<()>;

    fn router(&self) -> Result<&Router, LoadError>;

    fn query_router(&self) -> Result<&QueryRouter, LoadError>;

    fn ante_handler(&self) -> Result<&AnteHandler, LoadError>;

    fn fee_refund_handler(&self) -> Result<&FeeRefundHandler, LoadError>;

    fn fee_preprocess_handler(&self) -> Result<&FeePreprocessHandler, LoadError>;

    fn begin_blocker(&self, ctx: &mut Context<'_>, req: &RequestBeginBlock) -> FatalResult<ResponseBeginBlock>;

    fn end_blocker(&self, ctx: &mut Context<'_>, req: &RequestEndBlock) -> FatalResult<ResponseEndBlock>;

    /// Apply the genesis document in `req`, replaying genesis transactions
    /// through `deliver_tx`.
    fn init_chainer(
        &self,
        ctx: &mut Context<'_>,
        deliver_tx: &mut TxDeliverer<'_>,
        req: &RequestInitChain,
    ) -> FatalResult<ResponseInitChain>;

    /// Current state as a genesis document `init_chainer` accepts.
    fn export_genesis(&self, ctx: &Context<'_>) -> FatalResult<GenesisFileState>;
}
