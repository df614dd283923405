//! Service definitions, provider bindings and request/response escrow.

use std::sync::Arc;

use hub_store::{Context, StoreKey};
use hub_types::tags::keys;
use hub_types::{AccAddress, Coins, Tags};
use serde::{Deserialize, Serialize};

use crate::bank::BankKeeper;
use crate::error::{codespace, ModuleError, ModuleResult};
use crate::handler::{handler_fn, json_response, querier_fn, Handler, HandlerResult, Querier};
use crate::keeper::{Keeper, ValidateGenesis};
use crate::msg::Msg;
use crate::params::Subspace;

/// Stored in the `gov` parameter subspace.
pub const MAX_REQUEST_TIMEOUT_KEY: &str = "maxRequestTimeout";
pub const MIN_DEPOSIT_MULTIPLE_KEY: &str = "minDepositMultiple";

pub const DEFAULT_MAX_REQUEST_TIMEOUT: u64 = 100;
pub const DEFAULT_MIN_DEPOSIT_MULTIPLE: u64 = 1000;

pub const CODE_INVALID_DEFINITION: u32 = 100;
pub const CODE_DEFINITION_EXISTS: u32 = 101;
pub const CODE_UNKNOWN_DEFINITION: u32 = 102;
pub const CODE_BINDING_EXISTS: u32 = 103;
pub const CODE_UNKNOWN_BINDING: u32 = 104;
pub const CODE_INSUFFICIENT_DEPOSIT: u32 = 105;
pub const CODE_INVALID_TIMEOUT: u32 = 106;
pub const CODE_FEE_TOO_LOW: u32 = 107;
pub const CODE_UNKNOWN_REQUEST: u32 = 108;
pub const CODE_NOT_PROVIDER: u32 = 109;
pub const CODE_INVALID_PARAMS: u32 = 110;

const MAX_NAME_LENGTH: usize = 70;

const DEFINITION_PREFIX: &[u8] = b"definitions/";
const BINDING_PREFIX: &[u8] = b"bindings/";
const REQUEST_PREFIX: &[u8] = b"requests/";
const RESPONSE_PREFIX: &[u8] = b"responses/";
const NEXT_REQUEST_ID_KEY: &[u8] = b"requestId";

fn definition_key(name: &str) -> Vec<u8> {
    [DEFINITION_PREFIX, name.as_bytes()].concat()
}

fn binding_key(name: &str, provider: &AccAddress) -> Vec<u8> {
    [BINDING_PREFIX, name.as_bytes(), b"/", provider.as_bytes().as_slice()].concat()
}

fn request_key(id: u64) -> Vec<u8> {
    [REQUEST_PREFIX, id.to_be_bytes().as_slice()].concat()
}

fn response_key(id: u64) -> Vec<u8> {
    [RESPONSE_PREFIX, id.to_be_bytes().as_slice()].concat()
}

fn service_error(code: u32, reason: impl Into<String>) -> ModuleError {
    ModuleError::rejected(codespace::SERVICE, code, reason)
}

pub fn validate_max_request_timeout(value: &u64) -> Result<(), String> {
    if *value < 20 {
        return Err(format!("max request timeout must be at least 20 blocks, got {value}"));
    }
    Ok(())
}

pub fn validate_min_deposit_multiple(value: &u64) -> Result<(), String> {
    if !(500..=5000).contains(value) {
        return Err(format!("min deposit multiple must be in [500, 5000], got {value}"));
    }
    Ok(())
}

fn validate_name(name: &str) -> ModuleResult<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LENGTH
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(service_error(CODE_INVALID_DEFINITION, format!("invalid service name {name:?}")));
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub name: String,
    pub description: String,
    pub author: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBinding {
    pub service_name: String,
    pub provider: AccAddress,
    pub deposit: Coins,
    pub price: Coins,
    pub available: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: u64,
    pub service_name: String,
    pub provider: AccAddress,
    pub consumer: AccAddress,
    pub input: String,
    /// Escrowed until the provider responds or the request expires.
    pub service_fee: Coins,
    pub request_height: u64,
    pub expiration_height: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub request_id: u64,
    pub provider: AccAddress,
    pub output: String,
    pub height: u64,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgDefineService {
    pub name: String,
    pub description: String,
    pub author: AccAddress,
}

impl MsgDefineService {
    pub fn validate_basic(&self) -> ModuleResult<()> {
        validate_name(&self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgBindService {
    pub service_name: String,
    pub provider: AccAddress,
    pub deposit: Coins,
    pub price: Coins,
}

impl MsgBindService {
    pub fn validate_basic(&self) -> ModuleResult<()> {
        validate_name(&self.service_name)?;
        for coins in [&self.deposit, &self.price] {
            coins
                .validate()
                .map_err(|e| ModuleError::InvalidCoins(e.to_string()))?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCallService {
    pub service_name: String,
    pub provider: AccAddress,
    pub consumer: AccAddress,
    pub input: String,
    pub service_fee: Coins,
    /// Blocks until the request expires.
    pub timeout: u64,
}

impl MsgCallService {
    pub fn validate_basic(&self) -> ModuleResult<()> {
        validate_name(&self.service_name)?;
        if self.timeout == 0 {
            return Err(service_error(CODE_INVALID_TIMEOUT, "timeout must be positive"));
        }
        self.service_fee
            .validate()
            .map_err(|e| ModuleError::InvalidCoins(e.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgRespondService {
    pub request_id: u64,
    pub provider: AccAddress,
    pub output: String,
}

// ---------------------------------------------------------------------------
// Genesis
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceGenesis {
    pub max_request_timeout: u64,
    pub min_deposit_multiple: u64,
    pub definitions: Vec<ServiceDefinition>,
    pub bindings: Vec<ServiceBinding>,
    pub requests: Vec<ServiceRequest>,
}

impl Default for ServiceGenesis {
    fn default() -> Self {
        Self {
            max_request_timeout: DEFAULT_MAX_REQUEST_TIMEOUT,
            min_deposit_multiple: DEFAULT_MIN_DEPOSIT_MULTIPLE,
            definitions: Vec::new(),
            bindings: Vec::new(),
            requests: Vec::new(),
        }
    }
}

impl ValidateGenesis for ServiceGenesis {
    fn validate(&self) -> ModuleResult<()> {
        let invalid = |e: String| service_error(CODE_INVALID_PARAMS, e);
        validate_max_request_timeout(&self.max_request_timeout).map_err(invalid)?;
        validate_min_deposit_multiple(&self.min_deposit_multiple).map_err(invalid)
    }
}

// ---------------------------------------------------------------------------
// Keeper
// ---------------------------------------------------------------------------

pub struct ServiceKeeper {
    key: StoreKey,
    bank: Arc<BankKeeper>,
    /// The `gov` subspace.
    params: Subspace,
}

impl ServiceKeeper {
    pub fn new(key: StoreKey, bank: Arc<BankKeeper>, params: Subspace) -> Self {
        Self { key, bank, params }
    }

    pub fn max_request_timeout(&self, ctx: &Context<'_>) -> ModuleResult<u64> {
        self.params
            .get_or(ctx, MAX_REQUEST_TIMEOUT_KEY, DEFAULT_MAX_REQUEST_TIMEOUT)
    }

    pub fn min_deposit_multiple(&self, ctx: &Context<'_>) -> ModuleResult<u64> {
        self.params
            .get_or(ctx, MIN_DEPOSIT_MULTIPLE_KEY, DEFAULT_MIN_DEPOSIT_MULTIPLE)
    }

    pub fn definition(&self, ctx: &Context<'_>, name: &str) -> ModuleResult<Option<ServiceDefinition>> {
        Ok(ctx.get_value(&self.key, &definition_key(name))?)
    }

    pub fn binding(
        &self,
        ctx: &Context<'_>,
        name: &str,
        provider: &AccAddress,
    ) -> ModuleResult<Option<ServiceBinding>> {
        Ok(ctx.get_value(&self.key, &binding_key(name, provider))?)
    }

    pub fn request(&self, ctx: &Context<'_>, id: u64) -> ModuleResult<Option<ServiceRequest>> {
        Ok(ctx.get_value(&self.key, &request_key(id))?)
    }

    pub fn response(&self, ctx: &Context<'_>, id: u64) -> ModuleResult<Option<ServiceResponse>> {
        Ok(ctx.get_value(&self.key, &response_key(id))?)
    }

    fn scan<T: serde::de::DeserializeOwned>(&self, ctx: &Context<'_>, prefix: &[u8]) -> ModuleResult<Vec<T>> {
        Ok(ctx
            .scan_values::<T>(&self.key, prefix)?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    pub fn define(&self, ctx: &mut Context<'_>, def: ServiceDefinition) -> ModuleResult<()> {
        if self.definition(ctx, &def.name)?.is_some() {
            return Err(service_error(
                CODE_DEFINITION_EXISTS,
                format!("service {} already defined", def.name),
            ));
        }
        Ok(ctx.set_value(&self.key, &definition_key(&def.name), &def)?)
    }

    /// Minimum deposit for a binding at `price`.
    fn required_deposit(&self, ctx: &Context<'_>, price: &Coins) -> ModuleResult<Coins> {
        let multiple = self.min_deposit_multiple(ctx)? as u128;
        Ok(Coins::new(price.iter().map(|c| {
            hub_types::Coin::new(c.denom.clone(), c.amount.saturating_mul(multiple))
        })))
    }

    pub fn bind(&self, ctx: &mut Context<'_>, msg: &MsgBindService) -> ModuleResult<()> {
        if self.definition(ctx, &msg.service_name)?.is_none() {
            return Err(service_error(
                CODE_UNKNOWN_DEFINITION,
                format!("unknown service {}", msg.service_name),
            ));
        }
        if self.binding(ctx, &msg.service_name, &msg.provider)?.is_some() {
            return Err(service_error(CODE_BINDING_EXISTS, "provider already bound to this service"));
        }
        let required = self.required_deposit(ctx, &msg.price)?;
        if !msg.deposit.is_all_gte(&required) {
            return Err(service_error(
                CODE_INSUFFICIENT_DEPOSIT,
                format!("deposit {} below required {required}", msg.deposit),
            ));
        }
        self.bank.subtract_coins(ctx, &msg.provider, &msg.deposit)?;
        let binding = ServiceBinding {
            service_name: msg.service_name.clone(),
            provider: msg.provider,
            deposit: msg.deposit.clone(),
            price: msg.price.clone(),
            available: true,
        };
        Ok(ctx.set_value(&self.key, &binding_key(&msg.service_name, &msg.provider), &binding)?)
    }

    pub fn call(&self, ctx: &mut Context<'_>, msg: &MsgCallService) -> ModuleResult<u64> {
        let binding = self
            .binding(ctx, &msg.service_name, &msg.provider)?
            .filter(|b| b.available)
            .ok_or_else(|| service_error(CODE_UNKNOWN_BINDING, "no available binding for this provider"))?;
        let max_timeout = self.max_request_timeout(ctx)?;
        if msg.timeout > max_timeout {
            return Err(service_error(
                CODE_INVALID_TIMEOUT,
                format!("timeout {} exceeds maximum {max_timeout}", msg.timeout),
            ));
        }
        if !msg.service_fee.is_all_gte(&binding.price) {
            return Err(service_error(
                CODE_FEE_TOO_LOW,
                format!("service fee {} below price {}", msg.service_fee, binding.price),
            ));
        }
        self.bank.subtract_coins(ctx, &msg.consumer, &msg.service_fee)?;

        let id: u64 = ctx.get_value(&self.key, NEXT_REQUEST_ID_KEY)?.unwrap_or(1);
        ctx.set_value(&self.key, NEXT_REQUEST_ID_KEY, &(id + 1))?;
        let height = ctx.block_height();
        let request = ServiceRequest {
            id,
            service_name: msg.service_name.clone(),
            provider: msg.provider,
            consumer: msg.consumer,
            input: msg.input.clone(),
            service_fee: msg.service_fee.clone(),
            request_height: height,
            expiration_height: height + msg.timeout,
        };
        ctx.set_value(&self.key, &request_key(id), &request)?;
        Ok(id)
    }

    pub fn respond(&self, ctx: &mut Context<'_>, msg: &MsgRespondService) -> ModuleResult<()> {
        let request = self
            .request(ctx, msg.request_id)?
            .ok_or_else(|| service_error(CODE_UNKNOWN_REQUEST, format!("unknown request {}", msg.request_id)))?;
        if request.provider != msg.provider {
            return Err(service_error(CODE_NOT_PROVIDER, "only the bound provider may respond"));
        }
        self.bank.add_coins(ctx, &request.provider, &request.service_fee)?;
        ctx.delete(&self.key, &request_key(request.id))?;
        let response = ServiceResponse {
            request_id: request.id,
            provider: msg.provider,
            output: msg.output.clone(),
            height: ctx.block_height(),
        };
        Ok(ctx.set_value(&self.key, &response_key(request.id), &response)?)
    }

    /// Refund and drop every request whose expiration height has been reached.
    pub fn expire_requests(&self, ctx: &mut Context<'_>) -> ModuleResult<Vec<ServiceRequest>> {
        let height = ctx.block_height();
        let mut expired = Vec::new();
        for request in self.scan::<ServiceRequest>(ctx, REQUEST_PREFIX)? {
            if request.expiration_height > height {
                continue;
            }
            self.bank.add_coins(ctx, &request.consumer, &request.service_fee)?;
            ctx.delete(&self.key, &request_key(request.id))?;
            expired.push(request);
        }
        Ok(expired)
    }
}

impl Keeper for ServiceKeeper {
    type Genesis = ServiceGenesis;

    fn module_name(&self) -> &'static str {
        "service"
    }

    fn init_genesis(&self, ctx: &mut Context<'_>, state: &ServiceGenesis) -> ModuleResult<()> {
        self.params.set(ctx, MAX_REQUEST_TIMEOUT_KEY, &state.max_request_timeout)?;
        self.params.set(ctx, MIN_DEPOSIT_MULTIPLE_KEY, &state.min_deposit_multiple)?;
        for def in &state.definitions {
            ctx.set_value(&self.key, &definition_key(&def.name), def)?;
        }
        for binding in &state.bindings {
            ctx.set_value(&self.key, &binding_key(&binding.service_name, &binding.provider), binding)?;
        }
        let mut next_id = 1;
        for request in &state.requests {
            ctx.set_value(&self.key, &request_key(request.id), request)?;
            next_id = next_id.max(request.id + 1);
        }
        if !state.requests.is_empty() {
            ctx.set_value(&self.key, NEXT_REQUEST_ID_KEY, &next_id)?;
        }
        Ok(())
    }

    fn export_genesis(&self, ctx: &Context<'_>) -> ModuleResult<ServiceGenesis> {
        Ok(ServiceGenesis {
            max_request_timeout: self.max_request_timeout(ctx)?,
            min_deposit_multiple: self.min_deposit_multiple(ctx)?,
            definitions: self.scan(ctx, DEFINITION_PREFIX)?,
            bindings: self.scan(ctx, BINDING_PREFIX)?,
            requests: self.scan(ctx, REQUEST_PREFIX)?,
        })
    }
}

pub fn new_handler(keeper: Arc<ServiceKeeper>) -> Handler {
    handler_fn(move |ctx, msg| match msg {
        Msg::DefineService(m) => {
            keeper.define(
                ctx,
                ServiceDefinition {
                    name: m.name.clone(),
                    description: m.description.clone(),
                    author: m.author,
                },
            )?;
            Ok(HandlerResult::with_tags(Tags::new().with("service-name", &m.name)))
        }
        Msg::BindService(m) => {
            keeper.bind(ctx, m)?;
            Ok(HandlerResult::with_tags(
                Tags::new()
                    .with("service-name", &m.service_name)
                    .with("provider", m.provider),
            ))
        }
        Msg::CallService(m) => {
            let id = keeper.call(ctx, m)?;
            Ok(HandlerResult::with_tags(
                Tags::new()
                    .with(keys::REQUEST_ID, id)
                    .with("consumer", m.consumer)
                    .with("provider", m.provider),
            ))
        }
        Msg::RespondService(m) => {
            keeper.respond(ctx, m)?;
            Ok(HandlerResult::with_tags(
                Tags::new()
                    .with(keys::REQUEST_ID, m.request_id)
                    .with("provider", m.provider),
            ))
        }
        other => Err(ModuleError::UnknownRequest(format!(
            "service cannot handle {}",
            other.kind()
        ))),
    })
}

/// Query paths: `definition/<name>`, `binding/<name>/<provider>`,
/// `request/<id>`, `response/<id>`.
pub fn new_querier(keeper: Arc<ServiceKeeper>) -> Querier {
    querier_fn(move |ctx, path, _data| {
        let parse_id = |raw: &str| {
            raw.parse::<u64>()
                .map_err(|_| service_error(CODE_UNKNOWN_REQUEST, format!("invalid request id {raw:?}")))
        };
        match path {
            ["definition", name] => json_response(&keeper.definition(ctx, name)?),
            ["binding", name, provider] => {
                let provider =
                    AccAddress::parse(provider).map_err(|e| ModuleError::InvalidAddress(e.to_string()))?;
                json_response(&keeper.binding(ctx, name, &provider)?)
            }
            ["request", id] => json_response(&keeper.request(ctx, parse_id(*id)?)?),
            ["response", id] => json_response(&keeper.response(ctx, parse_id(*id)?)?),
            _ => Err(ModuleError::UnknownRequest(format!(
                "unknown service query {}",
                path.join("/")
            ))),
        }
    })
}

pub fn end_blocker(ctx: &mut Context<'_>, keeper: &ServiceKeeper) -> ModuleResult<Tags> {
    let mut tags = Tags::new();
    for request in keeper.expire_requests(ctx)? {
        tracing::debug!(request = request.id, "service request expired");
        tags.push(keys::ACTION, "service_request_timeout");
        tags.push(keys::REQUEST_ID, request.id);
    }
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use hub_store::{CommitMultiStore, StoreKeyRegistry};
    use hub_types::{BlockHeader, PubKey};

    use super::*;
    use crate::auth::AccountKeeper;
    use crate::params::ParamsKeeper;

    fn addr(seed: u8) -> AccAddress {
        AccAddress::from_pubkey(&PubKey::from_bytes([seed; 32]))
    }

    fn setup() -> (CommitMultiStore, Arc<BankKeeper>, ServiceKeeper) {
        let mut keys = StoreKeyRegistry::new();
        let acc = keys.register("acc").unwrap();
        let params = keys.register("params").unwrap();
        let tparams = keys.register_transient("transient_params").unwrap();
        let service = keys.register("service").unwrap();
        let bank = Arc::new(BankKeeper::new(Arc::new(AccountKeeper::new(acc))));
        let keeper = ServiceKeeper::new(
            service,
            Arc::clone(&bank),
            ParamsKeeper::new(params, tparams).subspace(crate::gov::PARAM_SPACE),
        );
        let mut store = CommitMultiStore::mount(&keys);
        {
            let mut ctx = Context::new(&mut store, BlockHeader::default());
            keeper.init_genesis(&mut ctx, &ServiceGenesis::default()).unwrap();
            bank.add_coins(&mut ctx, &addr(1), &Coins::single("airis", 10_000)).unwrap();
            bank.add_coins(&mut ctx, &addr(2), &Coins::single("airis", 100)).unwrap();
            keeper
                .define(
                    &mut ctx,
                    ServiceDefinition {
                        name: "oracle".into(),
                        description: String::new(),
                        author: addr(1),
                    },
                )
                .unwrap();
            keeper
                .bind(
                    &mut ctx,
                    &MsgBindService {
                        service_name: "oracle".into(),
                        provider: addr(1),
                        deposit: Coins::single("airis", 5_000),
                        price: Coins::single("airis", 5),
                    },
                )
                .unwrap();
        }
        (store, bank, keeper)
    }

    fn call(timeout: u64) -> MsgCallService {
        MsgCallService {
            service_name: "oracle".into(),
            provider: addr(1),
            consumer: addr(2),
            input: "price?".into(),
            service_fee: Coins::single("airis", 10),
            timeout,
        }
    }

    #[test]
    fn binding_requires_deposit_multiple() {
        let (mut store, _, keeper) = setup();
        let mut ctx = Context::new(&mut store, BlockHeader::default());
        let err = keeper
            .bind(
                &mut ctx,
                &MsgBindService {
                    service_name: "oracle".into(),
                    provider: addr(3),
                    deposit: Coins::single("airis", 10),
                    price: Coins::single("airis", 5),
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), CODE_INSUFFICIENT_DEPOSIT);
    }

    #[test]
    fn response_pays_provider() {
        let (mut store, bank, keeper) = setup();
        let mut ctx = Context::new(&mut store, BlockHeader { height: 5, ..BlockHeader::default() });
        let id = keeper.call(&mut ctx, &call(10)).unwrap();
        assert_eq!(bank.get_coins(&ctx, &addr(2)).unwrap().amount_of("airis"), 90);
        keeper
            .respond(
                &mut ctx,
                &MsgRespondService {
                    request_id: id,
                    provider: addr(1),
                    output: "42".into(),
                },
            )
            .unwrap();
        assert_eq!(bank.get_coins(&ctx, &addr(1)).unwrap().amount_of("airis"), 5_010);
        assert!(keeper.request(&ctx, id).unwrap().is_none());
        assert_eq!(keeper.response(&ctx, id).unwrap().unwrap().output, "42");
    }

    #[test]
    fn expired_request_refunds_consumer() {
        let (mut store, bank, keeper) = setup();
        {
            let mut ctx = Context::new(&mut store, BlockHeader { height: 5, ..BlockHeader::default() });
            assert_eq!(keeper.call(&mut ctx, &call(500)).unwrap_err().code(), CODE_INVALID_TIMEOUT);
            keeper.call(&mut ctx, &call(10)).unwrap();
        }
        let mut ctx = Context::new(&mut store, BlockHeader { height: 15, ..BlockHeader::default() });
        let tags = end_blocker(&mut ctx, &keeper).unwrap();
        assert_eq!(tags.get(keys::REQUEST_ID), Some("1"));
        assert_eq!(bank.get_coins(&ctx, &addr(2)).unwrap().amount_of("airis"), 100);
    }

    #[test]
    fn genesis_export_round_trips() {
        let (mut store, _, keeper) = setup();
        let mut ctx = Context::new(&mut store, BlockHeader { height: 5, ..BlockHeader::default() });
        keeper.call(&mut ctx, &call(10)).unwrap();
        let exported = keeper.export_genesis(&ctx).unwrap();
        assert_eq!(exported.bindings.len(), 1);
        assert_eq!(exported.requests.len(), 1);
        keeper.init_genesis(&mut ctx, &exported).unwrap();
        assert_eq!(keeper.export_genesis(&ctx).unwrap(), exported);
    }
}
