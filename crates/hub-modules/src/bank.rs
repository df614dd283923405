use std::sync::Arc;

use hub_store::Context;
use hub_types::tags::keys;
use hub_types::{AccAddress, Coins, Tags};
use serde::{Deserialize, Serialize};

use crate::auth::AccountKeeper;
use crate::error::{ModuleError, ModuleResult};
use crate::handler::{handler_fn, Handler, HandlerResult};
use crate::msg::Msg;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSend {
    pub from: AccAddress,
    pub to: AccAddress,
    pub amount: Coins,
}

impl MsgSend {
    pub fn validate_basic(&self) -> ModuleResult<()> {
        self.amount
            .validate()
            .map_err(|e| ModuleError::InvalidCoins(e.to_string()))?;
        if self.amount.is_empty() {
            return Err(ModuleError::InvalidCoins("send amount is empty".into()));
        }
        Ok(())
    }
}

/// Coin balances on top of the account keeper.
#[derive(Clone, Debug)]
pub struct BankKeeper {
    accounts: Arc<AccountKeeper>,
}

impl BankKeeper {
    pub fn new(accounts: Arc<AccountKeeper>) -> Self {
        Self { accounts }
    }

    pub fn get_coins(&self, ctx: &Context<'_>, addr: &AccAddress) -> ModuleResult<Coins> {
        Ok(self
            .accounts
            .get_account(ctx, addr)?
            .map(|a| a.coins)
            .unwrap_or_default())
    }

    pub fn has_coins(&self, ctx: &Context<'_>, addr: &AccAddress, amount: &Coins) -> ModuleResult<bool> {
        Ok(self.get_coins(ctx, addr)?.is_all_gte(amount))
    }

    /// Credit `amount`, creating the account if it does not exist yet.
    pub fn add_coins(&self, ctx: &mut Context<'_>, addr: &AccAddress, amount: &Coins) -> ModuleResult<Coins> {
        let mut account = match self.accounts.get_account(ctx, addr)? {
            Some(account) => account,
            None => self.accounts.new_account_with_address(ctx, *addr)?,
        };
        account.coins = account.coins.plus(amount);
        self.accounts.set_account(ctx, &account)?;
        Ok(account.coins)
    }

    pub fn subtract_coins(&self, ctx: &mut Context<'_>, addr: &AccAddress, amount: &Coins) -> ModuleResult<Coins> {
        let mut account = self
            .accounts
            .get_account(ctx, addr)?
            .ok_or_else(|| ModuleError::UnknownAddress(addr.to_string()))?;
        account.coins = account
            .coins
            .checked_sub(amount)
            .ok_or_else(|| ModuleError::InsufficientFunds {
                needed: amount.to_string(),
                available: account.coins.to_string(),
            })?;
        self.accounts.set_account(ctx, &account)?;
        Ok(account.coins)
    }

    pub fn send_coins(
        &self,
        ctx: &mut Context<'_>,
        from: &AccAddress,
        to: &AccAddress,
        amount: &Coins,
    ) -> ModuleResult<()> {
        self.subtract_coins(ctx, from, amount)?;
        self.add_coins(ctx, to, amount)?;
        Ok(())
    }
}

pub fn new_handler(keeper: Arc<BankKeeper>) -> Handler {
    handler_fn(move |ctx, msg| match msg {
        Msg::Send(m) => {
            keeper.send_coins(ctx, &m.from, &m.to, &m.amount)?;
            Ok(HandlerResult::with_tags(
                Tags::new()
                    .with(keys::SENDER, m.from)
                    .with(keys::RECIPIENT, m.to),
            ))
        }
        other => Err(ModuleError::UnknownRequest(format!(
            "bank cannot handle {}",
            other.kind()
        ))),
    })
}

#[cfg(test)]
mod tests {
    use hub_store::{CommitMultiStore, StoreKeyRegistry};
    use hub_types::{BlockHeader, PubKey};

    use super::*;

    fn addr(seed: u8) -> AccAddress {
        AccAddress::from_pubkey(&PubKey::from_bytes([seed; 32]))
    }

    fn setup() -> (CommitMultiStore, Arc<BankKeeper>) {
        let mut keys = StoreKeyRegistry::new();
        let acc = keys.register("acc").unwrap();
        let accounts = Arc::new(AccountKeeper::new(acc));
        (CommitMultiStore::mount(&keys), Arc::new(BankKeeper::new(accounts)))
    }

    #[test]
    fn send_moves_coins_and_creates_recipient() {
        let (mut store, bank) = setup();
        let mut ctx = Context::new(&mut store, BlockHeader::default());
        bank.add_coins(&mut ctx, &addr(1), &Coins::single("airis", 100)).unwrap();
        let handler = new_handler(Arc::clone(&bank));
        let msg = Msg::Send(MsgSend {
            from: addr(1),
            to: addr(2),
            amount: Coins::single("airis", 30),
        });
        let result = handler(&mut ctx, &msg).unwrap();
        assert_eq!(result.tags.get(keys::RECIPIENT), Some(addr(2).to_string().as_str()));
        assert_eq!(bank.get_coins(&ctx, &addr(1)).unwrap(), Coins::single("airis", 70));
        assert_eq!(bank.get_coins(&ctx, &addr(2)).unwrap(), Coins::single("airis", 30));
    }

    #[test]
    fn overdraft_is_user_error() {
        let (mut store, bank) = setup();
        let mut ctx = Context::new(&mut store, BlockHeader::default());
        bank.add_coins(&mut ctx, &addr(1), &Coins::single("airis", 10)).unwrap();
        let err = bank
            .send_coins(&mut ctx, &addr(1), &addr(2), &Coins::single("airis", 11))
            .unwrap_err();
        assert!(matches!(err, ModuleError::InsufficientFunds { .. }));
        assert!(!err.is_fatal());
    }
}
