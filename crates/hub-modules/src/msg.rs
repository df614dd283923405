use hub_types::AccAddress;
use serde::{Deserialize, Serialize};

use crate::bank::MsgSend;
use crate::distr::MsgWithdrawValidatorRewards;
use crate::error::ModuleResult;
use crate::gov::{MsgDeposit, MsgSubmitProposal, MsgVote};
use crate::guardian::{MsgAddProfiler, MsgAddTrustee};
use crate::record::MsgSubmitRecord;
use crate::service::{MsgBindService, MsgCallService, MsgDefineService, MsgRespondService};
use crate::slashing::MsgUnjail;
use crate::stake::{MsgBeginUnbonding, MsgCreateValidator, MsgDelegate};

/// Route names used by the message and query routers.
pub mod routes {
    pub const BANK: &str = "bank";
    pub const STAKE: &str = "stake";
    pub const SLASHING: &str = "slashing";
    pub const DISTR: &str = "distr";
    pub const GOV: &str = "gov";
    pub const RECORD: &str = "record";
    pub const SERVICE: &str = "service";
    pub const GUARDIAN: &str = "guardian";
}

/// Every message a transaction may carry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Msg {
    Send(MsgSend),
    CreateValidator(MsgCreateValidator),
    Delegate(MsgDelegate),
    BeginUnbonding(MsgBeginUnbonding),
    Unjail(MsgUnjail),
    WithdrawValidatorRewards(MsgWithdrawValidatorRewards),
    SubmitProposal(MsgSubmitProposal),
    Deposit(MsgDeposit),
    Vote(MsgVote),
    SubmitRecord(MsgSubmitRecord),
    DefineService(MsgDefineService),
    BindService(MsgBindService),
    CallService(MsgCallService),
    RespondService(MsgRespondService),
    AddProfiler(MsgAddProfiler),
    AddTrustee(MsgAddTrustee),
}

impl Msg {
    /// Router key for this message.
    pub fn route(&self) -> &'static str {
        match self {
            Self::Send(_) => routes::BANK,
            Self::CreateValidator(_) | Self::Delegate(_) | Self::BeginUnbonding(_) => routes::STAKE,
            Self::Unjail(_) => routes::SLASHING,
            Self::WithdrawValidatorRewards(_) => routes::DISTR,
            Self::SubmitProposal(_) | Self::Deposit(_) | Self::Vote(_) => routes::GOV,
            Self::SubmitRecord(_) => routes::RECORD,
            Self::DefineService(_)
            | Self::BindService(_)
            | Self::CallService(_)
            | Self::RespondService(_) => routes::SERVICE,
            Self::AddProfiler(_) | Self::AddTrustee(_) => routes::GUARDIAN,
        }
    }

    /// Short action name, emitted as the `action` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Send(_) => "send",
            Self::CreateValidator(_) => "create_validator",
            Self::Delegate(_) => "delegate",
            Self::BeginUnbonding(_) => "begin_unbonding",
            Self::Unjail(_) => "unjail",
            Self::WithdrawValidatorRewards(_) => "withdraw_validator_rewards",
            Self::SubmitProposal(_) => "submit_proposal",
            Self::Deposit(_) => "deposit",
            Self::Vote(_) => "vote",
            Self::SubmitRecord(_) => "submit_record",
            Self::DefineService(_) => "define_service",
            Self::BindService(_) => "bind_service",
            Self::CallService(_) => "call_service",
            Self::RespondService(_) => "respond_service",
            Self::AddProfiler(_) => "add_profiler",
            Self::AddTrustee(_) => "add_trustee",
        }
    }

    /// Stateless checks.
    pub fn validate_basic(&self) -> ModuleResult<()> {
        match self {
            Self::Send(m) => m.validate_basic(),
            Self::CreateValidator(m) => m.validate_basic(),
            Self::Delegate(m) => m.validate_basic(),
            Self::BeginUnbonding(m) => m.validate_basic(),
            Self::Unjail(_) | Self::WithdrawValidatorRewards(_) => Ok(()),
            Self::SubmitProposal(m) => m.validate_basic(),
            Self::Deposit(m) => m.validate_basic(),
            Self::Vote(_) => Ok(()),
            Self::SubmitRecord(m) => m.validate_basic(),
            Self::DefineService(m) => m.validate_basic(),
            Self::BindService(m) => m.validate_basic(),
            Self::CallService(m) => m.validate_basic(),
            Self::RespondService(_) => Ok(()),
            Self::AddProfiler(m) => m.validate_basic(),
            Self::AddTrustee(m) => m.validate_basic(),
        }
    }

    /// Accounts that must sign a transaction carrying this message.
    pub fn signers(&self) -> Vec<AccAddress> {
        match self {
            Self::Send(m) => vec![m.from],
            Self::CreateValidator(m) => vec![m.delegator],
            Self::Delegate(m) => vec![m.delegator],
            Self::BeginUnbonding(m) => vec![m.delegator],
            Self::Unjail(m) => vec![AccAddress::from(m.validator)],
            Self::WithdrawValidatorRewards(m) => vec![AccAddress::from(m.validator)],
            Self::SubmitProposal(m) => vec![m.proposer],
            Self::Deposit(m) => vec![m.depositor],
            Self::Vote(m) => vec![m.voter],
            Self::SubmitRecord(m) => vec![m.submitter],
            Self::DefineService(m) => vec![m.author],
            Self::BindService(m) => vec![m.provider],
            Self::CallService(m) => vec![m.consumer],
            Self::RespondService(m) => vec![m.provider],
            Self::AddProfiler(m) => vec![m.added_by],
            Self::AddTrustee(m) => vec![m.added_by],
        }
    }
}

#[cfg(test)]
mod tests {
    use hub_types::{Coins, PubKey};

    use super::*;

    #[test]
    fn route_and_kind() {
        let from = AccAddress::from_pubkey(&PubKey::from_bytes([1; 32]));
        let to = AccAddress::from_pubkey(&PubKey::from_bytes([2; 32]));
        let msg = Msg::Send(MsgSend {
            from,
            to,
            amount: Coins::single("airis", 5),
        });
        assert_eq!(msg.route(), "bank");
        assert_eq!(msg.kind(), "send");
        assert_eq!(msg.signers(), vec![from]);
    }

    #[test]
    fn unjail_signer_is_operator_account() {
        let acc = AccAddress::from_pubkey(&PubKey::from_bytes([3; 32]));
        let msg = Msg::Unjail(MsgUnjail {
            validator: acc.into(),
        });
        assert_eq!(msg.signers(), vec![acc]);
        assert_eq!(msg.route(), routes::SLASHING);
    }
}
