use hub_store::{Context, StoreKey};
use hub_types::{AccAddress, Coin, Coins, PubKey};
use serde::{Deserialize, Serialize};

use crate::error::{ModuleError, ModuleResult};
use crate::keeper::{Keeper, ValidateGenesis};

/// Native fee token used when genesis does not override it.
pub const DEFAULT_FEE_TOKEN: &str = "airis";
/// Minimum fee per unit of gas, in the native fee token.
pub const DEFAULT_GAS_PRICE_THRESHOLD: u128 = 20_000_000_000;

const ACCOUNT_PREFIX: &[u8] = b"acc/";
const GLOBAL_ACCOUNT_NUMBER_KEY: &[u8] = b"globalAccountNumber";
const COLLECTED_FEES_KEY: &[u8] = b"collectedFees";
const NATIVE_FEE_TOKEN_KEY: &[u8] = b"nativeFeeToken";
const GAS_PRICE_THRESHOLD_KEY: &[u8] = b"gasPriceThreshold";

fn account_key(addr: &AccAddress) -> Vec<u8> {
    [ACCOUNT_PREFIX, addr.as_bytes().as_slice()].concat()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: AccAddress,
    pub coins: Coins,
    pub pub_key: Option<PubKey>,
    pub account_number: u64,
    pub sequence: u64,
}

impl Account {
    pub fn new(address: AccAddress, account_number: u64) -> Self {
        Self {
            address,
            coins: Coins::empty(),
            pub_key: None,
            account_number,
            sequence: 0,
        }
    }
}

/// Owner of the account partition and the global account-number counter.
#[derive(Clone, Debug)]
pub struct AccountKeeper {
    key: StoreKey,
}

impl AccountKeeper {
    pub fn new(key: StoreKey) -> Self {
        Self { key }
    }

    pub fn store_key(&self) -> &StoreKey {
        &self.key
    }

    pub fn get_account(&self, ctx: &Context<'_>, addr: &AccAddress) -> ModuleResult<Option<Account>> {
        Ok(ctx.get_value(&self.key, &account_key(addr))?)
    }

    pub fn set_account(&self, ctx: &mut Context<'_>, account: &Account) -> ModuleResult<()> {
        Ok(ctx.set_value(&self.key, &account_key(&account.address), account)?)
    }

    /// Create an account at `addr` with the next account number. Not persisted.
    pub fn new_account_with_address(&self, ctx: &mut Context<'_>, addr: AccAddress) -> ModuleResult<Account> {
        let number = self.next_account_number(ctx)?;
        Ok(Account::new(addr, number))
    }

    /// Take the next account number from the global counter.
    pub fn next_account_number(&self, ctx: &mut Context<'_>) -> ModuleResult<u64> {
        let current: u64 = ctx
            .get_value(&self.key, GLOBAL_ACCOUNT_NUMBER_KEY)?
            .unwrap_or(0);
        ctx.set_value(&self.key, GLOBAL_ACCOUNT_NUMBER_KEY, &(current + 1))?;
        Ok(current)
    }

    /// All accounts in address order.
    pub fn accounts(&self, ctx: &Context<'_>) -> ModuleResult<Vec<Account>> {
        Ok(ctx
            .scan_values::<Account>(&self.key, ACCOUNT_PREFIX)?
            .into_iter()
            .map(|(_, account)| account)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Fee collection
// ---------------------------------------------------------------------------

/// Pool of fees collected during the current block, plus fee configuration.
#[derive(Clone, Debug)]
pub struct FeeCollectionKeeper {
    key: StoreKey,
}

impl FeeCollectionKeeper {
    pub fn new(key: StoreKey) -> Self {
        Self { key }
    }

    pub fn collected_fees(&self, ctx: &Context<'_>) -> ModuleResult<Coins> {
        Ok(ctx.get_value(&self.key, COLLECTED_FEES_KEY)?.unwrap_or_default())
    }

    pub fn set_collected_fees(&self, ctx: &mut Context<'_>, fees: &Coins) -> ModuleResult<()> {
        Ok(ctx.set_value(&self.key, COLLECTED_FEES_KEY, fees)?)
    }

    pub fn add_collected_fees(&self, ctx: &mut Context<'_>, fees: &Coins) -> ModuleResult<Coins> {
        let total = self.collected_fees(ctx)?.plus(fees);
        self.set_collected_fees(ctx, &total)?;
        Ok(total)
    }

    /// Take coins back out of the pool, e.g. for a refund.
    pub fn refund_collected_fees(&self, ctx: &mut Context<'_>, fees: &Coins) -> ModuleResult<()> {
        let current = self.collected_fees(ctx)?;
        let remaining = current.checked_sub(fees).ok_or_else(|| {
            ModuleError::Corrupt(format!("fee pool {current} cannot refund {fees}"))
        })?;
        self.set_collected_fees(ctx, &remaining)
    }

    pub fn clear_collected_fees(&self, ctx: &mut Context<'_>) -> ModuleResult<()> {
        self.set_collected_fees(ctx, &Coins::empty())
    }
}

/// Genesis section owned by auth.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthGenesis {
    pub collected_fees: Coins,
}

impl ValidateGenesis for AuthGenesis {
    fn validate(&self) -> ModuleResult<()> {
        self.collected_fees
            .validate()
            .map_err(|e| ModuleError::InvalidCoins(e.to_string()))
    }
}

impl Keeper for FeeCollectionKeeper {
    type Genesis = AuthGenesis;

    fn module_name(&self) -> &'static str {
        "auth"
    }

    fn init_genesis(&self, ctx: &mut Context<'_>, state: &AuthGenesis) -> ModuleResult<()> {
        self.set_collected_fees(ctx, &state.collected_fees)
    }

    fn export_genesis(&self, ctx: &Context<'_>) -> ModuleResult<AuthGenesis> {
        Ok(AuthGenesis {
            collected_fees: self.collected_fees(ctx)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Fee manager
// ---------------------------------------------------------------------------

/// Fee configuration fixed by the protocol version at genesis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeGenesisConfig {
    pub native_fee_token: String,
    pub gas_price_threshold: u128,
}

impl Default for FeeGenesisConfig {
    fn default() -> Self {
        Self {
            native_fee_token: DEFAULT_FEE_TOKEN.to_string(),
            gas_price_threshold: DEFAULT_GAS_PRICE_THRESHOLD,
        }
    }
}

/// Fee token and minimum gas price.
#[derive(Clone, Debug)]
pub struct FeeManager {
    key: StoreKey,
}

impl FeeManager {
    pub fn new(key: StoreKey) -> Self {
        Self { key }
    }

    pub fn init_genesis(&self, ctx: &mut Context<'_>, config: &FeeGenesisConfig) -> ModuleResult<()> {
        ctx.set_value(&self.key, NATIVE_FEE_TOKEN_KEY, &config.native_fee_token)?;
        ctx.set_value(&self.key, GAS_PRICE_THRESHOLD_KEY, &config.gas_price_threshold)?;
        Ok(())
    }

    pub fn native_fee_token(&self, ctx: &Context<'_>) -> ModuleResult<String> {
        Ok(ctx
            .get_value(&self.key, NATIVE_FEE_TOKEN_KEY)?
            .unwrap_or_else(|| DEFAULT_FEE_TOKEN.to_string()))
    }

    pub fn gas_price_threshold(&self, ctx: &Context<'_>) -> ModuleResult<u128> {
        Ok(ctx
            .get_value(&self.key, GAS_PRICE_THRESHOLD_KEY)?
            .unwrap_or(DEFAULT_GAS_PRICE_THRESHOLD))
    }

    /// Reject fees in a foreign token or below `gas * threshold`.
    pub fn check_fee(&self, ctx: &Context<'_>, fee: &crate::tx::StdFee) -> ModuleResult<()> {
        let token = self.native_fee_token(ctx)?;
        if let Some(foreign) = fee.amount.iter().find(|c| c.denom != token) {
            return Err(ModuleError::InsufficientFee(format!(
                "fee must be paid in {token}, got {foreign}"
            )));
        }
        let required = (fee.gas as u128).saturating_mul(self.gas_price_threshold(ctx)?);
        let offered = fee.amount.amount_of(&token);
        if offered < required {
            return Err(ModuleError::InsufficientFee(format!(
                "offered {}, minimum {}",
                Coin::new(token.clone(), offered),
                Coin::new(token, required)
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hub_store::{CommitMultiStore, StoreKeyRegistry};
    use hub_types::BlockHeader;

    use super::*;
    use crate::tx::StdFee;

    fn setup() -> (CommitMultiStore, AccountKeeper, FeeCollectionKeeper, FeeManager) {
        let mut keys = StoreKeyRegistry::new();
        let acc = keys.register("acc").unwrap();
        let fee = keys.register("fee").unwrap();
        (
            CommitMultiStore::mount(&keys),
            AccountKeeper::new(acc),
            FeeCollectionKeeper::new(fee.clone()),
            FeeManager::new(fee),
        )
    }

    #[test]
    fn account_numbers_increase() {
        let (mut store, accounts, _, _) = setup();
        let mut ctx = Context::new(&mut store, BlockHeader::default());
        let a = AccAddress::from_pubkey(&PubKey::from_bytes([1; 32]));
        let b = AccAddress::from_pubkey(&PubKey::from_bytes([2; 32]));
        let acc_a = accounts.new_account_with_address(&mut ctx, a).unwrap();
        let acc_b = accounts.new_account_with_address(&mut ctx, b).unwrap();
        assert_eq!((acc_a.account_number, acc_b.account_number), (0, 1));
        accounts.set_account(&mut ctx, &acc_a).unwrap();
        assert_eq!(accounts.get_account(&ctx, &a).unwrap(), Some(acc_a));
        assert_eq!(accounts.get_account(&ctx, &b).unwrap(), None);
    }

    #[test]
    fn fee_pool_add_and_refund() {
        let (mut store, _, fees, _) = setup();
        let mut ctx = Context::new(&mut store, BlockHeader::default());
        fees.add_collected_fees(&mut ctx, &Coins::single("airis", 100)).unwrap();
        fees.refund_collected_fees(&mut ctx, &Coins::single("airis", 40)).unwrap();
        assert_eq!(fees.collected_fees(&ctx).unwrap(), Coins::single("airis", 60));
        assert!(fees
            .refund_collected_fees(&mut ctx, &Coins::single("airis", 61))
            .unwrap_err()
            .is_fatal());
    }

    #[test]
    fn fee_threshold_and_token() {
        let (mut store, _, _, manager) = setup();
        let mut ctx = Context::new(&mut store, BlockHeader::default());
        manager
            .init_genesis(
                &mut ctx,
                &FeeGenesisConfig {
                    native_fee_token: "airis".into(),
                    gas_price_threshold: 10,
                },
            )
            .unwrap();
        manager
            .check_fee(&ctx, &StdFee::new(Coins::single("airis", 1000), 100))
            .unwrap();
        assert!(manager
            .check_fee(&ctx, &StdFee::new(Coins::single("airis", 999), 100))
            .is_err());
        assert!(manager
            .check_fee(&ctx, &StdFee::new(Coins::single("uatom", 5000), 100))
            .is_err());
    }
}
