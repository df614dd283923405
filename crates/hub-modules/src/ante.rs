//! Pre-execution transaction checks.
//!
//! The ante handler is a fail-fast pipeline of [`AnteStage`]s: signatures
//! first, then fee deduction. Fee preprocessing runs before the pipeline
//! and the fee refund runs after message execution.

use std::sync::Arc;

use hub_crypto::verify;
use hub_store::Context;
use hub_types::{AccAddress, Coins};

use crate::auth::{AccountKeeper, FeeCollectionKeeper, FeeManager};
use crate::error::{ModuleError, ModuleResult};
use crate::tx::{sign_bytes, StdTx};

/// Gas charged per signature verification.
pub const SIG_VERIFY_COST: u64 = 1000;

/// One step of the ante pipeline.
pub trait AnteStage: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, ctx: &mut Context<'_>, tx: &StdTx) -> ModuleResult<()>;
}

/// Ordered, fail-fast ante pipeline.
pub struct AnteHandler {
    stages: Vec<Box<dyn AnteStage>>,
}

impl AnteHandler {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Signature verification followed by fee deduction.
    pub fn with_default_stages(accounts: Arc<AccountKeeper>, fees: Arc<FeeCollectionKeeper>) -> Self {
        let mut handler = Self::new();
        handler.add_stage(Box::new(SignatureStage {
            accounts: Arc::clone(&accounts),
        }));
        handler.add_stage(Box::new(FeeDeductionStage { accounts, fees }));
        handler
    }

    pub fn add_stage(&mut self, stage: Box<dyn AnteStage>) {
        self.stages.push(stage);
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn run(&self, ctx: &mut Context<'_>, tx: &StdTx) -> ModuleResult<()> {
        for stage in &self.stages {
            if let Err(err) = stage.run(ctx, tx) {
                tracing::debug!(stage = stage.name(), error = %err, "ante stage rejected tx");
                return Err(err);
            }
        }
        Ok(())
    }
}

impl Default for AnteHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AnteHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnteHandler")
            .field("stages", &self.stage_names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Verifies one signature per signer and bumps each signer's sequence.
///
/// At genesis height the signed account number is 0, since accounts have
/// not been numbered when genesis transactions are produced.
pub struct SignatureStage {
    accounts: Arc<AccountKeeper>,
}

impl AnteStage for SignatureStage {
    fn name(&self) -> &str {
        "signature"
    }

    fn run(&self, ctx: &mut Context<'_>, tx: &StdTx) -> ModuleResult<()> {
        let signers = tx.signers();
        if signers.len() != tx.signatures.len() {
            return Err(ModuleError::Unauthorized("signature count mismatch".into()));
        }
        let chain_id = ctx.chain_id().to_string();
        let genesis = ctx.block_height() == 0;
        for (signer, sig) in signers.iter().zip(&tx.signatures) {
            let mut account = self
                .accounts
                .get_account(ctx, signer)?
                .ok_or_else(|| ModuleError::UnknownAddress(signer.to_string()))?;

            match account.pub_key {
                Some(known) if known != sig.pub_key => {
                    return Err(ModuleError::Unauthorized(format!(
                        "public key does not match account {signer}"
                    )));
                }
                Some(_) => {}
                None => {
                    if AccAddress::from_pubkey(&sig.pub_key) != *signer {
                        return Err(ModuleError::Unauthorized(format!(
                            "public key does not derive signer {signer}"
                        )));
                    }
                    account.pub_key = Some(sig.pub_key);
                }
            }

            if sig.sequence != account.sequence {
                return Err(ModuleError::InvalidSequence {
                    expected: account.sequence,
                    got: sig.sequence,
                });
            }
            let account_number = if genesis { 0 } else { account.account_number };
            let bytes = sign_bytes(
                &chain_id,
                account_number,
                account.sequence,
                &tx.fee,
                &tx.msgs,
                &tx.memo,
            )?;
            ctx.gas_meter().consume(SIG_VERIFY_COST, "ante verify: ed25519")?;
            verify(&sig.pub_key, &bytes, &sig.signature)
                .map_err(|e| ModuleError::Unauthorized(e.to_string()))?;

            account.sequence += 1;
            self.accounts.set_account(ctx, &account)?;
        }
        Ok(())
    }
}

/// Moves the offered fee from the payer into the fee-collection pool.
pub struct FeeDeductionStage {
    accounts: Arc<AccountKeeper>,
    fees: Arc<FeeCollectionKeeper>,
}

impl AnteStage for FeeDeductionStage {
    fn name(&self) -> &str {
        "fee-deduction"
    }

    fn run(&self, ctx: &mut Context<'_>, tx: &StdTx) -> ModuleResult<()> {
        if tx.fee.amount.is_empty() {
            return Ok(());
        }
        let payer = tx
            .fee_payer()
            .ok_or_else(|| ModuleError::UnknownRequest("tx carries no messages".into()))?;
        let mut account = self
            .accounts
            .get_account(ctx, &payer)?
            .ok_or_else(|| ModuleError::UnknownAddress(payer.to_string()))?;
        account.coins = account.coins.checked_sub(&tx.fee.amount).ok_or_else(|| {
            ModuleError::InsufficientFunds {
                needed: tx.fee.amount.to_string(),
                available: account.coins.to_string(),
            }
        })?;
        self.accounts.set_account(ctx, &account)?;
        self.fees.add_collected_fees(ctx, &tx.fee.amount)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fee handlers
// ---------------------------------------------------------------------------

/// Checks fee token and minimum gas price before any state is touched.
#[derive(Clone, Debug)]
pub struct FeePreprocessHandler {
    manager: Arc<FeeManager>,
}

impl FeePreprocessHandler {
    pub fn new(manager: Arc<FeeManager>) -> Self {
        Self { manager }
    }

    /// Skipped at genesis height.
    pub fn check(&self, ctx: &Context<'_>, tx: &StdTx) -> ModuleResult<()> {
        if ctx.block_height() == 0 {
            return Ok(());
        }
        self.manager.check_fee(ctx, &tx.fee)
    }
}

/// Returns the share of the fee that paid for unused gas.
#[derive(Clone, Debug)]
pub struct FeeRefundHandler {
    accounts: Arc<AccountKeeper>,
    fees: Arc<FeeCollectionKeeper>,
    manager: Arc<FeeManager>,
}

impl FeeRefundHandler {
    pub fn new(accounts: Arc<AccountKeeper>, fees: Arc<FeeCollectionKeeper>, manager: Arc<FeeManager>) -> Self {
        Self {
            accounts,
            fees,
            manager,
        }
    }

    pub fn refund(&self, ctx: &mut Context<'_>, tx: &StdTx, gas_used: u64) -> ModuleResult<Coins> {
        let gas_wanted = tx.fee.gas;
        if gas_wanted == 0 || gas_used >= gas_wanted || tx.fee.amount.is_empty() {
            return Ok(Coins::empty());
        }
        let token = self.manager.native_fee_token(ctx)?;
        let paid = tx.fee.amount.amount_of(&token);
        let unused = (gas_wanted - gas_used) as u128;
        let amount = paid.saturating_mul(unused) / gas_wanted as u128;
        if amount == 0 {
            return Ok(Coins::empty());
        }
        let refund = Coins::single(token, amount);
        let payer = tx
            .fee_payer()
            .ok_or_else(|| ModuleError::Corrupt("fee paid by a tx without messages".into()))?;
        let mut account = self
            .accounts
            .get_account(ctx, &payer)?
            .ok_or_else(|| ModuleError::Corrupt(format!("fee payer {payer} vanished")))?;
        self.fees.refund_collected_fees(ctx, &refund)?;
        account.coins = account.coins.plus(&refund);
        self.accounts.set_account(ctx, &account)?;
        Ok(refund)
    }
}
