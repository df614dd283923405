use std::sync::{Arc, OnceLock};

use hub_modules::auth::FeeGenesisConfig;
use hub_modules::distr::DistrParams;
use hub_modules::mint::MintParams;
use hub_modules::slashing::SlashingParams;
use hub_modules::stake::StakeParams;
use hub_modules::{
    bank, distr, gov, guardian, mint, record, routes, service, slashing, stake, upgrade,
    AnteHandler, FeePreprocessHandler, FeeRefundHandler, Keeper, ModuleError, ModuleResult,
    ParamRegistry, ParamTable, StakingHooks,
};
use hub_store::{Context, StoreKeyRegistry};
use hub_types::abci::{
    RequestBeginBlock, RequestEndBlock, RequestInitChain, ResponseBeginBlock, ResponseEndBlock,
    ResponseInitChain,
};
use hub_types::{ProtocolDefinition, Tags, ValidatorUpdate};

use crate::error::{FatalError, FatalResult, LoadError};
use crate::genesis::coordinator::TxDeliverer;
use crate::genesis::{GenesisAccount, GenesisCoordinator, GenesisFileState, GenesisState};
use crate::hooks::StakingHookChain;
use crate::keepers::KeeperSet;
use crate::keys::AppKeys;
use crate::protocol::Protocol;
use crate::router::{QueryRouter, Router};

/// Everything `load` builds.
struct Loaded {
    keepers: KeeperSet,
    params: Arc<ParamRegistry>,
    router: Router,
    query_router: QueryRouter,
    ante: AnteHandler,
    fee_refund: FeeRefundHandler,
    fee_preprocess: FeePreprocessHandler,
}

/// The initial protocol version.
pub struct ProtocolVersion0 {
    definition: ProtocolDefinition,
    keys: Arc<AppKeys>,
    registry: Arc<StoreKeyRegistry>,
    loaded: OnceLock<Loaded>,
}

impl ProtocolVersion0 {
    pub fn new(definition: ProtocolDefinition, keys: Arc<AppKeys>, registry: Arc<StoreKeyRegistry>) -> Self {
        Self {
            definition,
            keys,
            registry,
            loaded: OnceLock::new(),
        }
    }

    fn loaded(&self) -> Result<&Loaded, LoadError> {
        self.loaded
            .get()
            .ok_or(LoadError::NotLoaded(self.definition.version()))
    }

    /// The keeper set, once loaded.
    pub fn keepers(&self) -> Result<&KeeperSet, LoadError> {
        Ok(&self.loaded()?.keepers)
    }

    pub fn param_registry(&self) -> Result<&Arc<ParamRegistry>, LoadError> {
        Ok(&self.loaded()?.params)
    }

    fn build(&self) -> Result<Loaded, LoadError> {
        let keys = &self.keys;
        let params = Arc::new(ParamRegistry::new());

        // (a) keepers
        let keepers = KeeperSet::new(keys, Arc::clone(&params));

        // (b) hooks
        let subscribers: Vec<Arc<dyn StakingHooks>> =
            vec![keepers.distr.clone(), keepers.slashing.clone()];
        if !keepers.stake.set_hooks(Arc::new(StakingHookChain::new(subscribers))) {
            return Err(LoadError::HooksAlreadySet);
        }

        // (c) message routes
        let router = Router::new(Arc::clone(&self.registry))
            .add_route(routes::BANK, vec![keys.acc.clone()], bank::new_handler(keepers.bank.clone()))?
            .add_route(
                routes::STAKE,
                vec![
                    keys.stake.clone(),
                    keys.acc.clone(),
                    keys.distr.clone(),
                    keys.slashing.clone(),
                    keys.params.clone(),
                ],
                stake::new_handler(keepers.stake.clone()),
            )?
            .add_route(
                routes::SLASHING,
                vec![keys.slashing.clone(), keys.stake.clone(), keys.params.clone()],
                slashing::new_handler(keepers.slashing.clone()),
            )?
            .add_route(
                routes::DISTR,
                vec![keys.distr.clone(), keys.acc.clone()],
                distr::new_handler(keepers.distr.clone()),
            )?
            .add_route(
                routes::GOV,
                vec![
                    keys.gov.clone(),
                    keys.acc.clone(),
                    keys.stake.clone(),
                    keys.params.clone(),
                ],
                gov::new_handler(keepers.gov.clone()),
            )?
            .add_route(
                routes::RECORD,
                vec![keys.record.clone()],
                record::new_handler(keepers.record.clone()),
            )?
            .add_route(
                routes::SERVICE,
                vec![keys.service.clone(), keys.acc.clone(), keys.params.clone()],
                service::new_handler(keepers.service.clone()),
            )?
            .add_route(
                routes::GUARDIAN,
                vec![keys.guardian.clone()],
                guardian::new_handler(keepers.guardian.clone()),
            )?;

        // (d) query routes
        let query_router = QueryRouter::new()
            .add_route(routes::GOV, gov::new_querier(keepers.gov.clone()))?
            .add_route(routes::DISTR, distr::new_querier(keepers.distr.clone()))?
            .add_route(routes::SERVICE, service::new_querier(keepers.service.clone()))?
            .add_route(routes::RECORD, record::new_querier(keepers.record.clone()))?
            .add_route(routes::GUARDIAN, guardian::new_querier(keepers.guardian.clone()))?;

        // (e) ante and fee handlers
        let ante = AnteHandler::with_default_stages(keepers.accounts.clone(), keepers.fees.clone());
        let fee_refund = FeeRefundHandler::new(
            keepers.accounts.clone(),
            keepers.fees.clone(),
            keepers.fee_manager.clone(),
        );
        let fee_preprocess = FeePreprocessHandler::new(keepers.fee_manager.clone());

        // (f) parameter tables
        params.register(ParamTable::new(stake::PARAM_SPACE).param::<StakeParams>(
            stake::PARAMS_KEY,
            false,
            StakeParams::validate,
        ))?;
        params.register(ParamTable::new(slashing::PARAM_SPACE).param::<SlashingParams>(
            slashing::PARAMS_KEY,
            false,
            SlashingParams::validate,
        ))?;
        params.register(ParamTable::new(distr::PARAM_SPACE).param::<DistrParams>(
            distr::PARAMS_KEY,
            false,
            DistrParams::validate,
        ))?;
        params.register(ParamTable::new(mint::PARAM_SPACE).param::<MintParams>(
            mint::PARAMS_KEY,
            false,
            MintParams::validate,
        ))?;
        params.register(gov::param_table())?;
        params.register(upgrade::param_table())?;

        Ok(Loaded {
            keepers,
            params,
            router,
            query_router,
            ante,
            fee_refund,
            fee_preprocess,
        })
    }
}

impl std::fmt::Debug for ProtocolVersion0 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolVersion0")
            .field("definition", &self.definition)
            .field("loaded", &self.loaded.get().is_some())
            .finish()
    }
}

fn module_err(err: ModuleError) -> FatalError {
    FatalError::Module(err)
}

type BeginStep = fn(&KeeperSet, &mut Context<'_>, &RequestBeginBlock) -> ModuleResult<Tags>;
type EndStep = fn(&KeeperSet, &mut Context<'_>) -> ModuleResult<(Vec<ValidatorUpdate>, Tags)>;

/// Begin-block modules in execution order.
const BEGIN_BLOCKERS: [(&str, BeginStep); 3] = [
    ("slashing", |k, ctx, req| slashing::begin_blocker(ctx, req, &k.slashing)),
    ("distr", |k, ctx, req| distr::begin_blocker(ctx, req, &k.distr)),
    ("mint", |k, ctx, _req| mint::begin_blocker(ctx, &k.mint)),
];

/// End-block modules in execution order. Only stake yields validator updates.
const END_BLOCKERS: [(&str, EndStep); 3] = [
    ("gov", |k, ctx| Ok((Vec::new(), gov::end_blocker(ctx, &k.gov)?))),
    ("stake", |k, ctx| stake::end_blocker(ctx, &k.stake)),
    ("service", |k, ctx| Ok((Vec::new(), service::end_blocker(ctx, &k.service)?))),
];

impl ProtocolVersion0 {
    /// Run the begin-block modules, reporting each to `observe` before it
    /// runs. Tags are concatenated in module order.
    fn run_begin_blockers(
        &self,
        ctx: &mut Context<'_>,
        req: &RequestBeginBlock,
        observe: &mut dyn FnMut(&'static str),
    ) -> FatalResult<ResponseBeginBlock> {
        let k = &self.loaded()?.keepers;
        let mut tags = Tags::new();
        for (module, step) in BEGIN_BLOCKERS {
            observe(module);
            tags.append(step(k, ctx, req).map_err(module_err)?);
        }
        Ok(ResponseBeginBlock { tags })
    }

    fn run_end_blockers(
        &self,
        ctx: &mut Context<'_>,
        observe: &mut dyn FnMut(&'static str),
    ) -> FatalResult<ResponseEndBlock> {
        let k = &self.loaded()?.keepers;
        let mut tags = Tags::new();
        let mut validator_updates = Vec::new();
        for (module, step) in END_BLOCKERS {
            observe(module);
            let (updates, step_tags) = step(k, ctx).map_err(module_err)?;
            validator_updates.extend(updates);
            tags.append(step_tags);
        }
        Ok(ResponseEndBlock {
            validator_updates,
            tags,
        })
    }
}

impl Protocol for ProtocolVersion0 {
    fn definition(&self) -> &ProtocolDefinition {
        &self.definition
    }

    fn load(&self) -> Result<(), LoadError> {
        if self.loaded.get().is_some() {
            return Ok(());
        }
        let loaded = self.build()?;
        tracing::info!(
            version = self.definition.version(),
            routes = loaded.router.len(),
            "protocol loaded"
        );
        // Lifecycle calls are sequential, so a concurrent winner cannot exist.
        let _ = self.loaded.set(loaded);
        Ok(())
    }

    fn init(&self, _ctx: &mut Context<'_>) -> FatalResult<()> {
        self.loaded()?;
        tracing::info!(version = self.definition.version(), "protocol activated");
        Ok(())
    }

    fn router(&self) -> Result<&Router, LoadError> {
        Ok(&self.loaded()?.router)
    }

    fn query_router(&self) -> Result<&QueryRouter, LoadError> {
        Ok(&self.loaded()?.query_router)
    }

    fn ante_handler(&self) -> Result<&AnteHandler, LoadError> {
        Ok(&self.loaded()?.ante)
    }

    fn fee_refund_handler(&self) -> Result<&FeeRefundHandler, LoadError> {
        Ok(&self.loaded()?.fee_refund)
    }

    fn fee_preprocess_handler(&self) -> Result<&FeePreprocessHandler, LoadError> {
        Ok(&self.loaded()?.fee_preprocess)
    }

    fn begin_blocker(&self, ctx: &mut Context<'_>, req: &RequestBeginBlock) -> FatalResult<ResponseBeginBlock> {
        self.run_begin_blockers(ctx, req, &mut |module| tracing::trace!(module, "begin blocker"))
    }

    fn end_blocker(&self, ctx: &mut Context<'_>, _req: &RequestEndBlock) -> FatalResult<ResponseEndBlock> {
        self.run_end_blockers(ctx, &mut |module| tracing::trace!(module, "end blocker"))
    }

    fn init_chainer(
        &self,
        ctx: &mut Context<'_>,
        deliver_tx: &mut TxDeliverer<'_>,
        req: &RequestInitChain,
    ) -> FatalResult<ResponseInitChain> {
        let keepers = &self.loaded()?.keepers;
        GenesisCoordinator::new(keepers).run(ctx, deliver_tx, req)
    }

    fn export_genesis(&self, ctx: &Context<'_>) -> FatalResult<GenesisFileState> {
        let k = &self.loaded()?.keepers;
        let accounts = k
            .accounts
            .accounts(ctx)
            .map_err(module_err)?
            .into_iter()
            .map(|a| GenesisAccount {
                address: a.address,
                coins: a.coins,
                account_number: a.account_number,
                sequence: a.sequence,
            })
            .collect();
        let state = GenesisState {
            accounts,
            auth: k.fees.export_genesis(ctx).map_err(module_err)?,
            fee: FeeGenesisConfig {
                native_fee_token: k.fee_manager.native_fee_token(ctx).map_err(module_err)?,
                gas_price_threshold: k.fee_manager.gas_price_threshold(ctx).map_err(module_err)?,
            },
            stake: k.stake.export_genesis(ctx).map_err(module_err)?,
            mint: k.mint.export_genesis(ctx).map_err(module_err)?,
            distr: k.distr.export_genesis(ctx).map_err(module_err)?,
            gov: k.gov.export_genesis(ctx).map_err(module_err)?,
            slashing: k.slashing.export_genesis(ctx).map_err(module_err)?,
            service: k.service.export_genesis(ctx).map_err(module_err)?,
            guardian: k.guardian.export_genesis(ctx).map_err(module_err)?,
            arbitration: k.arbitration.export_genesis(ctx).map_err(module_err)?,
            gen_txs: Vec::new(),
        };
        Ok(state.into_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol() -> ProtocolVersion0 {
        let mut registry = StoreKeyRegistry::new();
        let keys = AppKeys::register(&mut registry).unwrap();
        ProtocolVersion0::new(
            ProtocolDefinition::new(0, "hub/v0", 0),
            Arc::new(keys),
            Arc::new(registry),
        )
    }

    #[test]
    fn accessors_fail_before_load() {
        let p = protocol();
        assert!(matches!(p.router(), Err(LoadError::NotLoaded(0))));
        assert!(p.ante_handler().is_err());
    }

    #[test]
    fn load_is_idempotent() {
        let p = protocol();
        p.load().unwrap();
        p.load().unwrap();
        let router = p.router().unwrap();
        assert_eq!(
            router.route_names(),
            vec!["bank", "distr", "gov", "guardian", "record", "service", "slashing", "stake"]
        );
        assert_eq!(
            p.query_router().unwrap().route_names(),
            vec!["distr", "gov", "guardian", "record", "service"]
        );
        assert_eq!(p.ante_handler().unwrap().stage_names(), vec!["signature", "fee-deduction"]);
        assert!(p.keepers().unwrap().stake.has_hooks());
    }

    #[test]
    fn route_keys_match_declarations() {
        let p = protocol();
        p.load().unwrap();
        let names = |route: &str| -> Vec<String> {
            p.router()
                .unwrap()
                .route(route)
                .unwrap()
                .required_keys()
                .iter()
                .map(|k| k.name().to_string())
                .collect()
        };
        assert_eq!(names("bank"), vec!["acc"]);
        assert_eq!(names("stake"), vec!["stake", "acc", "distr", "slashing", "params"]);
        assert_eq!(names("service"), vec!["service", "acc", "params"]);
    }

    #[test]
    fn governable_params_are_the_gov_table() {
        let p = protocol();
        p.load().unwrap();
        let registry = p.param_registry().unwrap();
        for space in ["stake", "slashing", "distr", "mint", "gov", "sig"] {
            assert!(registry.is_registered(space), "{space}");
        }
        let changeable = registry.gov_changeable();
        assert_eq!(changeable.len(), 5);
        assert!(changeable.iter().all(|(space, _)| space == "gov"));
    }

    #[test]
    fn empty_block_runs_modules_in_fixed_order() {
        let mut registry = StoreKeyRegistry::new();
        let keys = Arc::new(AppKeys::register(&mut registry).unwrap());
        let mut store = hub_store::CommitMultiStore::mount(&registry);
        let p = ProtocolVersion0::new(ProtocolDefinition::new(0, "hub/v0", 0), keys, Arc::new(registry));
        p.load().unwrap();

        let header = |height| hub_types::abci::BlockHeader {
            chain_id: "order".into(),
            height,
            time: height * 5,
            proposer: None,
        };
        {
            let mut ctx = Context::new(&mut store, header(0));
            p.init_chainer(
                &mut ctx,
                &mut |c: &mut Context<'_>, bytes: &[u8]| crate::tx::run_tx(&p, c, bytes, crate::tx::RunMode::Deliver),
                &RequestInitChain {
                    time: 0,
                    chain_id: "order".into(),
                    validators: Vec::new(),
                    app_state_bytes: GenesisFileState::default().to_json().unwrap(),
                },
            )
            .unwrap();
        }

        let mut ctx = Context::new(&mut store, header(1));
        let mut seen = Vec::new();
        p.run_begin_blockers(
            &mut ctx,
            &RequestBeginBlock {
                header: header(1),
                ..RequestBeginBlock::default()
            },
            &mut |m| seen.push(m),
        )
        .unwrap();
        let end = p.run_end_blockers(&mut ctx, &mut |m| seen.push(m)).unwrap();

        assert_eq!(seen, vec!["slashing", "distr", "mint", "gov", "stake", "service"]);
        assert!(end.validator_updates.is_empty());
    }
}
