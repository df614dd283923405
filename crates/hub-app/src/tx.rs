//! Transaction execution: decode, check, ante, route, refund.

use hub_modules::{decode_tx, HandlerResult, ModuleError, ModuleResult, StdTx};
use hub_store::{Context, GasMeter};
use hub_types::abci::{ResponseDeliverTx, CODE_OK};
use hub_types::tags::keys;
use hub_types::Tags;

use crate::error::{FatalError, FatalResult};
use crate::protocol::Protocol;
use crate::router::Router;

/// How far a transaction runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Mempool admission: ante checks only, plus the node's local gas-price
    /// floor. Callers run this inside a sandbox.
    Check { min_gas_price: u64 },
    /// Block execution.
    Deliver,
}

/// Turn a module error into a response, or escalate it if fatal.
fn reject(err: ModuleError, gas_wanted: u64, gas_used: u64) -> FatalResult<ResponseDeliverTx> {
    if err.is_fatal() {
        tracing::error!(error = %err, "fatal error during transaction");
        return Err(FatalError::Module(err));
    }
    tracing::debug!(code = err.code(), codespace = err.codespace(), error = %err, "transaction rejected");
    Ok(ResponseDeliverTx {
        code: err.code(),
        codespace: err.codespace().to_string(),
        log: err.to_string(),
        gas_wanted,
        gas_used,
        tags: Tags::new(),
    })
}

fn check_min_gas_price(tx: &StdTx, min_gas_price: u64) -> ModuleResult<()> {
    if min_gas_price == 0 {
        return Ok(());
    }
    // Fee preprocessing has already restricted the fee to the native token.
    let offered: u128 = tx.fee.amount.iter().map(|c| c.amount).sum();
    let required = u128::from(tx.fee.gas).saturating_mul(u128::from(min_gas_price));
    if offered < required {
        return Err(ModuleError::InsufficientFee(format!(
            "offered {offered}, local minimum {required}"
        )));
    }
    Ok(())
}

/// Route every message, collecting tags in message order. The first
/// failure aborts the rest.
fn run_msgs(router: &Router, ctx: &mut Context<'_>, tx: &StdTx) -> ModuleResult<HandlerResult> {
    let mut tags = Tags::new();
    let mut logs = Vec::new();
    for (index, msg) in tx.msgs.iter().enumerate() {
        let route = router
            .route(msg.route())
            .ok_or_else(|| ModuleError::UnknownRequest(format!("no route for {}", msg.route())))?;
        let mut scoped = ctx.scoped(route.required_keys());
        let result = (route.handler())(&mut scoped, msg)?;
        tags.push(keys::ACTION, msg.kind());
        tags.append(result.tags);
        if !result.log.is_empty() {
            logs.push(format!("{index}: {}", result.log));
        }
    }
    Ok(HandlerResult {
        tags,
        log: logs.join("\n"),
    })
}

/// Run one encoded transaction against `ctx`.
///
/// User errors come back as a response with a non-zero code. Only errors
/// that compromise the node's state are returned as `Err`.
pub fn run_tx(
    protocol: &dyn Protocol,
    ctx: &mut Context<'_>,
    bytes: &[u8],
    mode: RunMode,
) -> FatalResult<ResponseDeliverTx> {
    let tx = match decode_tx(bytes) {
        Ok(tx) => tx,
        Err(err) => return reject(err, 0, 0),
    };
    let gas_wanted = tx.fee.gas;
    if let Err(err) = tx.validate_basic() {
        return reject(err, gas_wanted, 0);
    }
    if let Err(err) = protocol.fee_preprocess_handler()?.check(ctx, &tx) {
        return reject(err, gas_wanted, 0);
    }
    if let RunMode::Check { min_gas_price } = mode {
        if let Err(err) = check_min_gas_price(&tx, min_gas_price) {
            return reject(err, gas_wanted, 0);
        }
    }

    let ante = protocol.ante_handler()?;
    let router = protocol.router()?;
    let (outcome, gas_used) = {
        let mut tx_ctx = ctx.metered(GasMeter::new(gas_wanted));
        if let Err(err) = tx_ctx.branch(|c| ante.run(c, &tx)) {
            let used = tx_ctx.gas_meter().consumed();
            return reject(err, gas_wanted, used);
        }
        let outcome = match mode {
            RunMode::Deliver => tx_ctx.branch(|c| run_msgs(router, c, &tx)),
            RunMode::Check { .. } => Ok(HandlerResult::default()),
        };
        (outcome, tx_ctx.gas_meter().consumed())
    };

    // Ante effects are committed; the unused share of the fee goes back
    // whether or not the messages succeeded.
    protocol
        .fee_refund_handler()?
        .refund(ctx, &tx, gas_used)
        .map_err(FatalError::Module)?;

    match outcome {
        Ok(result) => Ok(ResponseDeliverTx {
            code: CODE_OK,
            codespace: String::new(),
            log: result.log,
            gas_wanted,
            gas_used,
            tags: result.tags,
        }),
        Err(err) => reject(err, gas_wanted, gas_used),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hub_crypto::SigningKey;
    use hub_modules::auth::Account;
    use hub_modules::bank::MsgSend;
    use hub_modules::record::MsgSubmitRecord;
    use hub_modules::tx::{build_signed_tx, TxSigner};
    use hub_modules::{encode_tx, Msg, StdFee};
    use hub_store::{CommitMultiStore, StoreKeyRegistry};
    use hub_types::{AccAddress, BlockHeader, Coin, Coins, ProtocolDefinition};

    use super::*;
    use crate::keys::AppKeys;
    use crate::protocol::ProtocolVersion0;

    const CHAIN: &str = "test-chain";
    const FEE_GAS: u64 = 200_000;
    const FEE: u128 = 20_000_000_000 * FEE_GAS as u128;

    struct Fixture {
        protocol: ProtocolVersion0,
        store: CommitMultiStore,
        keys: Arc<AppKeys>,
        registry: Arc<StoreKeyRegistry>,
        signer: SigningKey,
        sender: AccAddress,
    }

    fn header() -> BlockHeader {
        BlockHeader {
            chain_id: CHAIN.into(),
            height: 5,
            time: 1_000,
            proposer: None,
        }
    }

    fn fixture() -> Fixture {
        let mut registry = StoreKeyRegistry::new();
        let keys = Arc::new(AppKeys::register(&mut registry).unwrap());
        let store = CommitMultiStore::mount(&registry);
        let registry = Arc::new(registry);
        let protocol = ProtocolVersion0::new(
            ProtocolDefinition::new(0, "hub/v0", 0),
            Arc::clone(&keys),
            Arc::clone(&registry),
        );
        protocol.load().unwrap();
        let signer = SigningKey::from_bytes([4; 32]);
        let sender = signer.address();
        let mut fx = Fixture {
            protocol,
            store,
            keys,
            registry,
            signer,
            sender,
        };
        let accounts = Arc::clone(&fx.protocol.keepers().unwrap().accounts);
        let mut ctx = Context::new(&mut fx.store, header());
        let mut account = Account::new(fx.sender, 0);
        account.coins = Coins::single("airis", FEE * 10);
        accounts.set_account(&mut ctx, &account).unwrap();
        fx
    }

    fn signed(fx: &Fixture, msgs: Vec<Msg>, sequence: u64) -> Vec<u8> {
        let tx = build_signed_tx(
            CHAIN,
            msgs,
            StdFee::new(Coins::single("airis", FEE), FEE_GAS),
            "",
            &[TxSigner {
                key: &fx.signer,
                account_number: 0,
                sequence,
            }],
        )
        .unwrap();
        encode_tx(&tx).unwrap()
    }

    fn send(fx: &Fixture, amount: u128) -> Msg {
        Msg::Send(MsgSend {
            from: fx.sender,
            to: AccAddress::from_bytes([9; 20]),
            amount: Coins::new([Coin::new("airis", amount)]),
        })
    }

    fn account(fx: &mut Fixture) -> Account {
        let accounts = Arc::clone(&fx.protocol.keepers().unwrap().accounts);
        let ctx = Context::new(&mut fx.store, header());
        accounts.get_account(&ctx, &fx.sender).unwrap().unwrap()
    }

    #[test]
    fn successful_send_tags_action_first() {
        let mut fx = fixture();
        let bytes = signed(&fx, vec![send(&fx, 5)], 0);
        let res = {
            let mut ctx = Context::new(&mut fx.store, header());
            run_tx(&fx.protocol, &mut ctx, &bytes, RunMode::Deliver).unwrap()
        };
        assert!(res.is_ok(), "{}", res.log);
        assert_eq!(res.tags.iter().next().unwrap().key, keys::ACTION);
        assert_eq!(res.tags.get(keys::ACTION), Some("send"));
        assert!(res.gas_used > 0 && res.gas_used <= FEE_GAS);
        assert_eq!(account(&mut fx).sequence, 1);
    }

    #[test]
    fn garbage_bytes_are_a_user_error() {
        let mut fx = fixture();
        let mut ctx = Context::new(&mut fx.store, header());
        let res = run_tx(&fx.protocol, &mut ctx, b"\xff\xff", RunMode::Deliver).unwrap();
        assert_eq!(res.code, ModuleError::TxDecode(String::new()).code());
    }

    #[test]
    fn failed_message_keeps_only_ante_effects() {
        let mut fx = fixture();
        let before = account(&mut fx);
        // Spends more than the balance left after the fee.
        let bytes = signed(&fx, vec![send(&fx, FEE * 10)], 0);
        let res = {
            let mut ctx = Context::new(&mut fx.store, header());
            run_tx(&fx.protocol, &mut ctx, &bytes, RunMode::Deliver).unwrap()
        };
        assert!(!res.is_ok());
        assert!(res.tags.is_empty());

        let after = account(&mut fx);
        assert_eq!(after.sequence, before.sequence + 1);
        let charged = before.coins.amount_of("airis") - after.coins.amount_of("airis");
        assert!(charged > 0 && charged <= FEE, "charged {charged}");

        let recipient = {
            let accounts = Arc::clone(&fx.protocol.keepers().unwrap().accounts);
            let ctx = Context::new(&mut fx.store, header());
            accounts.get_account(&ctx, &AccAddress::from_bytes([9; 20])).unwrap()
        };
        assert!(recipient.is_none());
    }

    #[test]
    fn bad_signature_leaves_no_trace() {
        let mut fx = fixture();
        let before = account(&mut fx);
        let bytes = signed(&fx, vec![send(&fx, 5)], 3);
        let res = {
            let mut ctx = Context::new(&mut fx.store, header());
            run_tx(&fx.protocol, &mut ctx, &bytes, RunMode::Deliver).unwrap()
        };
        assert_eq!(res.code, 3);
        assert_eq!(account(&mut fx), before);
    }

    #[test]
    fn check_mode_skips_handlers_and_applies_local_floor() {
        let mut fx = fixture();
        let overspend = signed(&fx, vec![send(&fx, FEE * 100)], 0);
        let cheap = signed(&fx, vec![send(&fx, 1)], 1);
        let mut ctx = Context::new(&mut fx.store, header()).with_check_tx(true);
        let res = run_tx(&fx.protocol, &mut ctx, &overspend, RunMode::Check { min_gas_price: 0 }).unwrap();
        assert!(res.is_ok(), "handlers must not run in check mode: {}", res.log);

        let res = run_tx(
            &fx.protocol,
            &mut ctx,
            &cheap,
            RunMode::Check {
                min_gas_price: u64::MAX,
            },
        )
        .unwrap();
        assert_eq!(res.code, ModuleError::InsufficientFee(String::new()).code());
    }

    #[test]
    fn handler_outside_its_scope_is_fatal() {
        let mut fx = fixture();
        let stake_key = fx.keys.stake.clone();
        let rogue = hub_modules::handler_fn(move |ctx, _msg| {
            ctx.set(&stake_key, b"rogue", vec![1])?;
            Ok(HandlerResult::default())
        });
        let router = Router::new(Arc::clone(&fx.registry))
            .add_route("record", vec![fx.keys.record.clone()], rogue)
            .unwrap();
        let tx = StdTx {
            msgs: vec![Msg::SubmitRecord(MsgSubmitRecord {
                submitter: fx.sender,
                description: "d".into(),
                data: b"payload".to_vec(),
            })],
            fee: StdFee::new(Coins::empty(), 0),
            signatures: Vec::new(),
            memo: String::new(),
        };
        let mut ctx = Context::new(&mut fx.store, header());
        let err = run_msgs(&router, &mut ctx, &tx).unwrap_err();
        assert!(err.is_fatal(), "{err}");
    }

    #[test]
    fn unrouted_message_is_unknown_request() {
        let mut fx = fixture();
        let router = Router::new(Arc::clone(&fx.registry));
        let tx = StdTx {
            msgs: vec![send(&fx, 1)],
            fee: StdFee::new(Coins::empty(), 0),
            signatures: Vec::new(),
            memo: String::new(),
        };
        let mut ctx = Context::new(&mut fx.store, header());
        let err = run_msgs(&router, &mut ctx, &tx).unwrap_err();
        assert_eq!(err.code(), 6);
    }
}
