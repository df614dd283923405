use std::sync::Arc;

use hub_modules::arbitration::ArbitrationKeeper;
use hub_modules::auth::{AccountKeeper, FeeCollectionKeeper, FeeManager};
use hub_modules::bank::BankKeeper;
use hub_modules::distr::{self, DistrKeeper};
use hub_modules::gov::{self, GovKeeper};
use hub_modules::guardian::GuardianKeeper;
use hub_modules::mint::{self, MintKeeper};
use hub_modules::record::RecordKeeper;
use hub_modules::service::ServiceKeeper;
use hub_modules::slashing::{self, SlashingKeeper};
use hub_modules::stake::{self, StakeKeeper};
use hub_modules::upgrade::{self, UpgradeKeeper};
use hub_modules::{ParamRegistry, ParamsKeeper};

use crate::keys::AppKeys;

/// One protocol version's keepers, wired to each other at construction.
pub struct KeeperSet {
    pub accounts: Arc<AccountKeeper>,
    pub fees: Arc<FeeCollectionKeeper>,
    pub fee_manager: Arc<FeeManager>,
    pub params: ParamsKeeper,
    pub bank: Arc<BankKeeper>,
    pub stake: Arc<StakeKeeper>,
    pub slashing: Arc<SlashingKeeper>,
    pub distr: Arc<DistrKeeper>,
    pub mint: Arc<MintKeeper>,
    pub gov: Arc<GovKeeper>,
    pub service: Arc<ServiceKeeper>,
    pub guardian: Arc<GuardianKeeper>,
    pub record: Arc<RecordKeeper>,
    pub arbitration: Arc<ArbitrationKeeper>,
    pub upgrade: Arc<UpgradeKeeper>,
}

impl KeeperSet {
    /// Build every keeper. Hooks are not attached here.
    pub fn new(keys: &AppKeys, param_registry: Arc<ParamRegistry>) -> Self {
        let params = ParamsKeeper::new(keys.params.clone(), keys.transient_params.clone());
        let accounts = Arc::new(AccountKeeper::new(keys.acc.clone()));
        let fees = Arc::new(FeeCollectionKeeper::new(keys.fee.clone()));
        let fee_manager = Arc::new(FeeManager::new(keys.fee.clone()));
        let bank = Arc::new(BankKeeper::new(Arc::clone(&accounts)));

        let stake = Arc::new(StakeKeeper::new(
            keys.stake.clone(),
            Arc::clone(&bank),
            params.subspace(stake::PARAM_SPACE),
        ));
        let mint = Arc::new(MintKeeper::new(
            keys.mint.clone(),
            Arc::clone(&stake),
            Arc::clone(&fees),
            params.subspace(mint::PARAM_SPACE),
        ));
        let distr = Arc::new(DistrKeeper::new(
            keys.distr.clone(),
            Arc::clone(&bank),
            Arc::clone(&stake),
            Arc::clone(&fees),
            params.subspace(distr::PARAM_SPACE),
        ));
        let slashing = Arc::new(SlashingKeeper::new(
            keys.slashing.clone(),
            Arc::clone(&stake),
            params.subspace(slashing::PARAM_SPACE),
        ));
        let gov = Arc::new(GovKeeper::new(
            keys.gov.clone(),
            Arc::clone(&bank),
            Arc::clone(&stake),
            params.clone(),
            param_registry,
        ));
        let service = Arc::new(ServiceKeeper::new(
            keys.service.clone(),
            Arc::clone(&bank),
            params.subspace(gov::PARAM_SPACE),
        ));
        let guardian = Arc::new(GuardianKeeper::new(keys.guardian.clone()));
        let record = Arc::new(RecordKeeper::new(keys.record.clone()));
        let arbitration = Arc::new(ArbitrationKeeper::new(params.subspace(gov::PARAM_SPACE)));
        let upgrade = Arc::new(UpgradeKeeper::new(params.subspace(upgrade::PARAM_SPACE)));

        Self {
            accounts,
            fees,
            fee_manager,
            params,
            bank,
            stake,
            slashing,
            distr,
            mint,
            gov,
            service,
            guardian,
            record,
            arbitration,
            upgrade,
        }
    }
}

impl std::fmt::Debug for KeeperSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeeperSet")
            .field("stake", &self.stake)
            .finish_non_exhaustive()
    }
}
