//! The application shell driven by the consensus engine.

use std::sync::Arc;

use hub_modules::ModuleError;
use hub_store::{CommitMultiStore, Context, StoreKeyRegistry};
use hub_types::abci::{
    BlockHeader, RequestBeginBlock, RequestEndBlock, RequestInitChain, RequestQuery, ResponseBeginBlock,
    ResponseCheckTx, ResponseCommit, ResponseDeliverTx, ResponseEndBlock, ResponseInitChain, ResponseQuery,
    CODE_OK,
};
use hub_types::ProtocolDefinition;

use crate::config::AppConfig;
use crate::engine::ProtocolEngine;
use crate::error::{FatalError, FatalResult, LoadError};
use crate::genesis::GenesisFileState;
use crate::keys::AppKeys;
use crate::protocol::{Protocol, ProtocolVersion0};
use crate::tx::{run_tx, RunMode};

/// Reference of the first protocol version.
pub const V0_REFERENCE: &str = "hub/v0";

/// One node's application state and its protocol versions.
///
/// Calls arrive in consensus order: `init_chain` once, then for each block
/// `begin_block`, any number of `deliver_tx`, `end_block` and `commit`.
/// `check_tx` and `query` may arrive between blocks.
pub struct HubApp {
    chain_id: String,
    registry: Arc<StoreKeyRegistry>,
    keys: Arc<AppKeys>,
    store: CommitMultiStore,
    engine: ProtocolEngine,
    /// Header of the block in progress.
    header: Option<BlockHeader>,
    last_header: BlockHeader,
    initialized: bool,
    min_gas_price: u64,
    /// Set by the first fatal failure. Every later call is refused.
    halted: Option<String>,
}

impl HubApp {
    /// An app running protocol version 0 from genesis.
    pub fn new(chain_id: impl Into<String>) -> Result<Self, LoadError> {
        let mut registry = StoreKeyRegistry::new();
        let keys = Arc::new(AppKeys::register(&mut registry)?);
        let registry = Arc::new(registry);
        let v0 = ProtocolVersion0::new(
            ProtocolDefinition::new(0, V0_REFERENCE, 0),
            Arc::clone(&keys),
            Arc::clone(&registry),
        );
        let mut engine = ProtocolEngine::new();
        engine.add(Arc::new(v0))?;
        Ok(Self::with_engine(chain_id, registry, keys, engine))
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, LoadError> {
        Ok(Self::new(config.chain_id.clone())?.with_min_gas_price(config.min_gas_price))
    }

    /// Assemble an app from an engine whose protocols were built over
    /// `registry` and `keys`.
    pub fn with_engine(
        chain_id: impl Into<String>,
        registry: Arc<StoreKeyRegistry>,
        keys: Arc<AppKeys>,
        engine: ProtocolEngine,
    ) -> Self {
        let chain_id = chain_id.into();
        let store = CommitMultiStore::mount(&registry);
        Self {
            last_header: BlockHeader {
                chain_id: chain_id.clone(),
                ..BlockHeader::default()
            },
            chain_id,
            registry,
            keys,
            store,
            engine,
            header: None,
            initialized: false,
            min_gas_price: 0,
            halted: None,
        }
    }

    pub fn with_min_gas_price(mut self, min_gas_price: u64) -> Self {
        self.min_gas_price = min_gas_price;
        self
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn keys(&self) -> &Arc<AppKeys> {
        &self.keys
    }

    pub fn registry(&self) -> &Arc<StoreKeyRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &ProtocolEngine {
        &self.engine
    }

    /// Height of the last committed block.
    pub fn last_height(&self) -> u64 {
        self.last_header.height
    }

    pub fn last_app_hash(&self) -> [u8; 32] {
        self.store.last_commit().app_hash
    }

    /// Definition of the active protocol version, if any.
    pub fn current_protocol(&self) -> Option<&ProtocolDefinition> {
        self.engine.current().map(|p| p.definition())
    }

    /// Reason for the halt, once a call has failed fatally.
    pub fn halted(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    /// Run `f` unless halted. Any failure other than calling out of order
    /// halts the app; store writes it made are never retried.
    fn guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> FatalResult<T>) -> FatalResult<T> {
        if let Some(reason) = &self.halted {
            return Err(FatalError::Halted(reason.clone()));
        }
        let res = f(self);
        match &res {
            Err(FatalError::NotInitialized) | Ok(_) => {}
            Err(err) => {
                tracing::error!(error = %err, "fatal error, halting");
                self.halted = Some(err.to_string());
            }
        }
        res
    }

    fn active(&self) -> FatalResult<Arc<dyn Protocol>> {
        self.engine.current().cloned().ok_or(FatalError::NotInitialized)
    }

    /// Header used for checks and queries between blocks.
    fn idle_header(&self) -> BlockHeader {
        BlockHeader {
            height: self.last_header.height + 1,
            proposer: None,
            ..self.last_header.clone()
        }
    }

    pub fn init_chain(&mut self, req: &RequestInitChain) -> FatalResult<ResponseInitChain> {
        self.guarded(|app| app.apply_init_chain(req))
    }

    fn apply_init_chain(&mut self, req: &RequestInitChain) -> FatalResult<ResponseInitChain> {
        if self.initialized {
            return Err(FatalError::Bootstrap {
                from: crate::genesis::BootstrapPhase::Ready,
                to: crate::genesis::BootstrapPhase::DocumentParsed,
            });
        }
        if !req.chain_id.is_empty() && req.chain_id != self.chain_id {
            tracing::warn!(configured = %self.chain_id, requested = %req.chain_id, "adopting chain id from consensus");
            self.chain_id = req.chain_id.clone();
        }
        let header = BlockHeader {
            chain_id: self.chain_id.clone(),
            height: 0,
            time: req.time,
            proposer: None,
        };

        let mut ctx = Context::new(&mut self.store, header.clone());
        let protocol = self.engine.activate(&mut ctx, 0)?;
        let res = protocol.init_chainer(
            &mut ctx,
            &mut |c: &mut Context<'_>, bytes: &[u8]| run_tx(protocol.as_ref(), c, bytes, RunMode::Deliver),
            req,
        )?;

        self.last_header = header;
        self.initialized = true;
        tracing::info!(
            chain_id = %self.chain_id,
            validators = res.validators.len(),
            "chain initialized"
        );
        Ok(res)
    }

    pub fn begin_block(&mut self, req: &RequestBeginBlock) -> FatalResult<ResponseBeginBlock> {
        self.guarded(|app| app.apply_begin_block(req))
    }

    fn apply_begin_block(&mut self, req: &RequestBeginBlock) -> FatalResult<ResponseBeginBlock> {
        if !self.initialized {
            return Err(FatalError::NotInitialized);
        }
        let header = req.header.clone();
        let mut ctx = Context::new(&mut self.store, header.clone());
        let protocol = self.engine.activate(&mut ctx, header.height)?;
        let res = protocol.begin_blocker(&mut ctx, req)?;
        tracing::debug!(height = header.height, tags = res.tags.len(), "begin block");
        self.header = Some(header);
        Ok(res)
    }

    pub fn deliver_tx(&mut self, bytes: &[u8]) -> FatalResult<ResponseDeliverTx> {
        self.guarded(|app| app.apply_deliver_tx(bytes))
    }

    fn apply_deliver_tx(&mut self, bytes: &[u8]) -> FatalResult<ResponseDeliverTx> {
        let header = self.header.clone().ok_or(FatalError::NotInitialized)?;
        let protocol = self.active()?;
        let mut ctx = Context::new(&mut self.store, header);
        run_tx(protocol.as_ref(), &mut ctx, bytes, RunMode::Deliver)
    }

    /// Mempool admission. Never changes state.
    pub fn check_tx(&mut self, bytes: &[u8]) -> FatalResult<ResponseCheckTx> {
        self.guarded(|app| app.apply_check_tx(bytes))
    }

    fn apply_check_tx(&mut self, bytes: &[u8]) -> FatalResult<ResponseCheckTx> {
        let protocol = self.active()?;
        let header = self.idle_header();
        let mode = RunMode::Check {
            min_gas_price: self.min_gas_price,
        };
        let mut ctx = Context::new(&mut self.store, header).with_check_tx(true);
        ctx.sandbox(|c| run_tx(protocol.as_ref(), c, bytes, mode))
    }

    pub fn end_block(&mut self, req: &RequestEndBlock) -> FatalResult<ResponseEndBlock> {
        self.guarded(|app| app.apply_end_block(req))
    }

    fn apply_end_block(&mut self, req: &RequestEndBlock) -> FatalResult<ResponseEndBlock> {
        let header = self.header.clone().ok_or(FatalError::NotInitialized)?;
        let protocol = self.active()?;
        let mut ctx = Context::new(&mut self.store, header);
        let res = protocol.end_blocker(&mut ctx, req)?;
        if !res.validator_updates.is_empty() {
            tracing::info!(height = req.height, updates = res.validator_updates.len(), "validator set changed");
        }
        Ok(res)
    }

    pub fn commit(&mut self) -> FatalResult<ResponseCommit> {
        self.guarded(|app| app.apply_commit())
    }

    fn apply_commit(&mut self) -> FatalResult<ResponseCommit> {
        let header = self.header.take().ok_or(FatalError::NotInitialized)?;
        let info = self.store.commit();
        tracing::info!(
            height = header.height,
            version = info.version,
            app_hash = %hex::encode(info.app_hash),
            "committed"
        );
        self.last_header = header;
        Ok(ResponseCommit {
            data: info.app_hash.to_vec(),
        })
    }

    /// Answer a read-only query.
    ///
    /// Paths: `app/version`, and `custom/<route>/<args...>` for module
    /// queriers.
    pub fn query(&mut self, req: &RequestQuery) -> FatalResult<ResponseQuery> {
        self.guarded(|app| app.apply_query(req))
    }

    fn apply_query(&mut self, req: &RequestQuery) -> FatalResult<ResponseQuery> {
        let height = self.last_header.height;
        let segments: Vec<&str> = req.path.trim_matches('/').split('/').collect();
        let result = match segments.as_slice() {
            ["app", "version"] => match self.current_protocol() {
                Some(def) => serde_json::to_vec(def).map_err(|e| ModuleError::Corrupt(e.to_string())),
                None => Err(ModuleError::UnknownRequest("chain is not initialized".into())),
            },
            ["custom", route, args @ ..] => {
                let protocol = self.active()?;
                let header = self.idle_header();
                match protocol.query_router()?.route(route) {
                    Some(querier) => {
                        let mut ctx = Context::new(&mut self.store, header);
                        ctx.sandbox(|c| querier(&*c, args, &req.data))
                    }
                    None => Err(ModuleError::UnknownRequest(format!("no querier for {route}"))),
                }
            }
            _ => Err(ModuleError::UnknownRequest(format!("unknown query path {}", req.path))),
        };

        match result {
            Ok(value) => Ok(ResponseQuery {
                code: CODE_OK,
                value,
                height,
                ..ResponseQuery::default()
            }),
            Err(err) if err.is_fatal() => Err(FatalError::Module(err)),
            Err(err) => Ok(ResponseQuery {
                code: err.code(),
                codespace: err.codespace().to_string(),
                log: err.to_string(),
                value: Vec::new(),
                height,
            }),
        }
    }

    /// Current state as a genesis document.
    pub fn export_genesis(&mut self) -> FatalResult<GenesisFileState> {
        self.guarded(|app| app.apply_export_genesis())
    }

    fn apply_export_genesis(&mut self) -> FatalResult<GenesisFileState> {
        let protocol = self.active()?;
        let ctx = Context::new(&mut self.store, self.last_header.clone());
        protocol.export_genesis(&ctx)
    }
}

impl std::fmt::Debug for HubApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubApp")
            .field("chain_id", &self.chain_id)
            .field("engine", &self.engine)
            .field("last_height", &self.last_header.height)
            .field("initialized", &self.initialized)
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}
