use hub_modules::auth::Account;
use hub_modules::{encode_tx, Keeper, ModuleError};
use hub_store::Context;
use hub_types::abci::{RequestInitChain, ResponseDeliverTx, ResponseInitChain};
use hub_types::{compare_validator_sets, ValidatorUpdate};

use crate::error::{FatalError, FatalResult};
use crate::genesis::{GenesisFileState, GenesisState};
use crate::keepers::KeeperSet;

/// Delivery path used to replay genesis transactions.
pub type TxDeliverer<'f> = dyn FnMut(&mut Context<'_>, &[u8]) -> FatalResult<ResponseDeliverTx> + 'f;

/// Progress of chain bootstrap. Moves forward one phase at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootstrapPhase {
    Uninitialized,
    DocumentParsed,
    AccountsLoaded,
    ModulesSeeded,
    GenesisTxsReplayed,
    ValidatorSetReconciled,
    Ready,
}

impl BootstrapPhase {
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Uninitialized => Some(Self::DocumentParsed),
            Self::DocumentParsed => Some(Self::AccountsLoaded),
            Self::AccountsLoaded => Some(Self::ModulesSeeded),
            Self::ModulesSeeded => Some(Self::GenesisTxsReplayed),
            Self::GenesisTxsReplayed => Some(Self::ValidatorSetReconciled),
            Self::ValidatorSetReconciled => Some(Self::Ready),
            Self::Ready => None,
        }
    }
}

fn step(name: &'static str) -> impl FnOnce(ModuleError) -> FatalError {
    move |source| FatalError::GenesisStep { step: name, source }
}

/// Applies a genesis document to a fresh store, one module at a time.
///
/// Any failure leaves the coordinator in its failed phase; a bootstrap is
/// never retried.
#[derive(Debug)]
pub struct GenesisCoordinator<'k> {
    keepers: &'k KeeperSet,
    phase: BootstrapPhase,
    failed: bool,
}

impl<'k> GenesisCoordinator<'k> {
    pub fn new(keepers: &'k KeeperSet) -> Self {
        Self {
            keepers,
            phase: BootstrapPhase::Uninitialized,
            failed: false,
        }
    }

    pub fn phase(&self) -> BootstrapPhase {
        self.phase
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    fn advance(&mut self, to: BootstrapPhase) -> FatalResult<()> {
        if self.failed || self.phase.next() != Some(to) {
            return Err(FatalError::Bootstrap {
                from: self.phase,
                to,
            });
        }
        tracing::info!(from = ?self.phase, to = ?to, "bootstrap phase");
        self.phase = to;
        Ok(())
    }

    /// Run the full bootstrap and return the initial validator set.
    pub fn run(
        &mut self,
        ctx: &mut Context<'_>,
        deliver_tx: &mut TxDeliverer<'_>,
        req: &RequestInitChain,
    ) -> FatalResult<ResponseInitChain> {
        let result = self.run_steps(ctx, deliver_tx, req);
        if let Err(err) = &result {
            self.failed = true;
            tracing::error!(phase = ?self.phase, error = %err, "bootstrap failed");
        }
        result
    }

    fn run_steps(
        &mut self,
        ctx: &mut Context<'_>,
        deliver_tx: &mut TxDeliverer<'_>,
        req: &RequestInitChain,
    ) -> FatalResult<ResponseInitChain> {
        if self.phase != BootstrapPhase::Uninitialized {
            return Err(FatalError::Bootstrap {
                from: self.phase,
                to: BootstrapPhase::DocumentParsed,
            });
        }
        let k = self.keepers;

        let mut state = GenesisFileState::from_json(&req.app_state_bytes)?.into_state()?;
        self.advance(BootstrapPhase::DocumentParsed)?;

        self.load_accounts(ctx, &mut state)?;
        self.advance(BootstrapPhase::AccountsLoaded)?;

        k.stake.init_genesis(ctx, &state.stake).map_err(step("stake"))?;
        let mut validators = k
            .stake
            .apply_and_return_validator_set_updates(ctx)
            .map_err(step("stake"))?;
        k.gov.init_genesis(ctx, &state.gov).map_err(step("gov"))?;
        k.fees.init_genesis(ctx, &state.auth).map_err(step("auth"))?;
        k.fee_manager
            .init_genesis(ctx, &state.fee)
            .map_err(step("auth"))?;
        k.slashing
            .init_genesis(ctx, &state.slashing)
            .map_err(step("slashing"))?;
        k.slashing
            .register_genesis_validators(ctx, &state.stake)
            .map_err(step("slashing"))?;
        k.mint.init_genesis(ctx, &state.mint).map_err(step("mint"))?;
        k.distr.init_genesis(ctx, &state.distr).map_err(step("distr"))?;
        state.validate().map_err(FatalError::InvalidGenesis)?;
        self.advance(BootstrapPhase::ModulesSeeded)?;

        if !state.gen_txs.is_empty() {
            for (index, tx) in state.gen_txs.iter().enumerate() {
                let bytes = encode_tx(tx).map_err(step("gen_txs"))?;
                let res = deliver_tx(ctx, &bytes)?;
                if !res.is_ok() {
                    return Err(FatalError::GenesisTx {
                        index,
                        code: res.code,
                        codespace: res.codespace,
                        log: res.log,
                    });
                }
            }
            let changes = k
                .stake
                .apply_and_return_validator_set_updates(ctx)
                .map_err(step("gen_txs"))?;
            merge_updates(&mut validators, changes);
            tracing::info!(count = state.gen_txs.len(), "genesis transactions replayed");
        }
        self.advance(BootstrapPhase::GenesisTxsReplayed)?;

        if req.validators.is_empty() {
            tracing::info!(validators = validators.len(), "no consensus validator set supplied");
        } else {
            compare_validator_sets(&req.validators, &validators)?;
        }
        self.advance(BootstrapPhase::ValidatorSetReconciled)?;

        k.service
            .init_genesis(ctx, &state.service)
            .map_err(step("service"))?;
        k.arbitration
            .init_genesis(ctx, &state.arbitration)
            .map_err(step("arbitration"))?;
        k.guardian
            .init_genesis(ctx, &state.guardian)
            .map_err(step("guardian"))?;
        k.upgrade.init_defaults(ctx).map_err(step("upgrade"))?;
        self.advance(BootstrapPhase::Ready)?;

        Ok(ResponseInitChain { validators })
    }

    /// Number accounts in declared order from the keeper's counter. Ties keep
    /// document order.
    fn load_accounts(&self, ctx: &mut Context<'_>, state: &mut GenesisState) -> FatalResult<()> {
        let accounts = &self.keepers.accounts;
        state.accounts.sort_by_key(|a| a.account_number);
        for declared in &mut state.accounts {
            let number = accounts.next_account_number(ctx).map_err(step("accounts"))?;
            let account = Account {
                address: declared.address,
                coins: declared.coins.clone(),
                pub_key: None,
                account_number: number,
                sequence: declared.sequence,
            };
            accounts.set_account(ctx, &account).map_err(step("accounts"))?;
            tracing::debug!(
                address = %declared.address,
                declared = declared.account_number,
                assigned = number,
                "genesis account loaded"
            );
            declared.account_number = number;
        }
        Ok(())
    }
}

/// Fold later updates into an earlier set, keyed by public key. Power zero
/// removes the entry.
fn merge_updates(set: &mut Vec<ValidatorUpdate>, changes: Vec<ValidatorUpdate>) {
    for change in changes {
        match set.iter().position(|u| u.pub_key == change.pub_key) {
            Some(i) if change.power == 0 => {
                set.remove(i);
            }
            Some(i) => set[i].power = change.power,
            None if change.power > 0 => set.push(change),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use hub_modules::stake::{BondStatus, Validator, POWER_REDUCTION};
    use hub_modules::ParamRegistry;
    use hub_store::{CommitMultiStore, StoreKeyRegistry};
    use hub_types::{AccAddress, BlockHeader, PubKey, ValAddress};
    use proptest::prelude::*;

    use super::*;
    use crate::genesis::GenesisFileAccount;
    use crate::keys::AppKeys;

    struct Fixture {
        store: CommitMultiStore,
        keepers: KeeperSet,
    }

    fn fixture() -> Fixture {
        let mut registry = StoreKeyRegistry::new();
        let keys = AppKeys::register(&mut registry).unwrap();
        Fixture {
            store: CommitMultiStore::mount(&registry),
            keepers: KeeperSet::new(&keys, Arc::new(ParamRegistry::new())),
        }
    }

    fn addr(seed: u8) -> AccAddress {
        AccAddress::from_pubkey(&PubKey::from_bytes([seed; 32]))
    }

    fn request(file: &GenesisFileState, validators: Vec<ValidatorUpdate>) -> RequestInitChain {
        RequestInitChain {
            time: 0,
            chain_id: "test-chain".into(),
            validators,
            app_state_bytes: file.to_json().unwrap(),
        }
    }

    fn no_txs() -> impl FnMut(&mut Context<'_>, &[u8]) -> FatalResult<ResponseDeliverTx> {
        |_, _| panic!("no genesis transactions expected")
    }

    fn bonded_validator(seed: u8, power: u128) -> Validator {
        let mut v = Validator::new(
            ValAddress::from(addr(seed)),
            PubKey::from_bytes([seed; 32]),
            format!("v{seed}"),
        );
        v.tokens = power * POWER_REDUCTION;
        v.delegator_shares = v.tokens;
        v.status = BondStatus::Bonded;
        v
    }

    fn run(fx: &mut Fixture, req: &RequestInitChain) -> FatalResult<ResponseInitChain> {
        let mut ctx = Context::new(&mut fx.store, BlockHeader::default());
        let mut coordinator = GenesisCoordinator::new(&fx.keepers);
        let res = coordinator.run(&mut ctx, &mut no_txs(), req);
        if res.is_ok() {
            assert_eq!(coordinator.phase(), BootstrapPhase::Ready);
        } else {
            assert!(coordinator.has_failed());
        }
        res
    }

    #[test]
    fn phases_only_move_forward() {
        let fx = fixture();
        let mut coordinator = GenesisCoordinator::new(&fx.keepers);
        coordinator.advance(BootstrapPhase::DocumentParsed).unwrap();
        assert!(matches!(
            coordinator.advance(BootstrapPhase::ModulesSeeded),
            Err(FatalError::Bootstrap { .. })
        ));
        assert!(matches!(
            coordinator.advance(BootstrapPhase::Uninitialized),
            Err(FatalError::Bootstrap { .. })
        ));
        assert_eq!(BootstrapPhase::Ready.next(), None);
    }

    #[test]
    fn empty_consensus_list_returns_computed_set() {
        let mut fx = fixture();
        let mut file = GenesisFileState::default();
        file.stake.validators.push(bonded_validator(1, 10));
        let res = run(&mut fx, &request(&file, Vec::new())).unwrap();
        assert_eq!(
            res.validators,
            vec![ValidatorUpdate::new(PubKey::from_bytes([1; 32]), 10)]
        );
    }

    #[test]
    fn matching_consensus_list_is_accepted() {
        let mut fx = fixture();
        let mut file = GenesisFileState::default();
        file.stake.validators.push(bonded_validator(1, 10));
        file.stake.validators.push(bonded_validator(2, 4));
        let expected = vec![
            ValidatorUpdate::new(PubKey::from_bytes([2; 32]), 4),
            ValidatorUpdate::new(PubKey::from_bytes([1; 32]), 10),
        ];
        assert!(run(&mut fx, &request(&file, expected)).is_ok());
    }

    #[test]
    fn mismatched_consensus_list_is_fatal() {
        let mut file = GenesisFileState::default();
        file.stake.validators.push(bonded_validator(1, 10));

        let extra = vec![
            ValidatorUpdate::new(PubKey::from_bytes([1; 32]), 10),
            ValidatorUpdate::new(PubKey::from_bytes([9; 32]), 1),
        ];
        let wrong_power = vec![ValidatorUpdate::new(PubKey::from_bytes([1; 32]), 11)];
        let wrong_key = vec![ValidatorUpdate::new(PubKey::from_bytes([3; 32]), 10)];

        for validators in [extra, wrong_power, wrong_key] {
            let mut fx = fixture();
            let err = run(&mut fx, &request(&file, validators)).unwrap_err();
            assert!(matches!(err, FatalError::ValidatorSetMismatch(_)), "{err}");
        }
    }

    #[test]
    fn invalid_module_section_is_fatal() {
        let mut fx = fixture();
        let mut file = GenesisFileState::default();
        file.gov.starting_proposal_id = 0;
        let err = run(&mut fx, &request(&file, Vec::new())).unwrap_err();
        assert!(matches!(err, FatalError::InvalidGenesis(_)));
    }

    #[test]
    fn merge_overrides_and_removes() {
        let a = PubKey::from_bytes([1; 32]);
        let b = PubKey::from_bytes([2; 32]);
        let c = PubKey::from_bytes([3; 32]);
        let mut set = vec![ValidatorUpdate::new(a, 1), ValidatorUpdate::new(b, 2)];
        merge_updates(
            &mut set,
            vec![
                ValidatorUpdate::new(a, 0),
                ValidatorUpdate::new(b, 5),
                ValidatorUpdate::new(c, 3),
            ],
        );
        assert_eq!(set, vec![ValidatorUpdate::new(b, 5), ValidatorUpdate::new(c, 3)]);
    }

    fn assigned_numbers(declared: &[(u8, u64)]) -> BTreeMap<AccAddress, u64> {
        let mut fx = fixture();
        let file = GenesisFileState {
            accounts: declared
                .iter()
                .map(|(seed, number)| GenesisFileAccount {
                    address: addr(*seed),
                    coins: vec!["1airis".into()],
                    account_number: *number,
                    sequence_number: 0,
                })
                .collect(),
            ..GenesisFileState::default()
        };
        run(&mut fx, &request(&file, Vec::new())).unwrap();
        let ctx = Context::new(&mut fx.store, BlockHeader::default());
        fx.keepers
            .accounts
            .accounts(&ctx)
            .unwrap()
            .into_iter()
            .map(|a| (a.address, a.account_number))
            .collect()
    }

    proptest! {
        #[test]
        fn account_numbering_ignores_document_order(
            numbers in proptest::collection::btree_set(0u64..1000, 1..8),
            shuffle_seed in any::<u64>(),
        ) {
            let declared: Vec<(u8, u64)> = numbers
                .iter()
                .enumerate()
                .map(|(i, n)| (i as u8 + 1, *n))
                .collect();
            let mut permuted = declared.clone();
            let len = permuted.len();
            for i in (1..len).rev() {
                let j = (shuffle_seed.wrapping_mul(i as u64 + 7) % (i as u64 + 1)) as usize;
                permuted.swap(i, j);
            }

            let canonical = assigned_numbers(&declared);
            prop_assert_eq!(&canonical, &assigned_numbers(&permuted));

            // Ascending declared order maps to 0..n.
            for (rank, (seed, _)) in declared.iter().enumerate() {
                prop_assert_eq!(canonical[&addr(*seed)], rank as u64);
            }
        }
    }
}
