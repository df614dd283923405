//! Request and response records exchanged with the consensus engine.

use serde::{Deserialize, Serialize};

use crate::address::ConsAddress;
use crate::tags::Tags;
use crate::validator::ValidatorUpdate;

/// Code returned for a successful transaction or query.
pub const CODE_OK: u32 = 0;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub chain_id: String,
    pub height: u64,
    /// Block time, unix seconds.
    pub time: u64,
    pub proposer: Option<ConsAddress>,
}

/// One validator's participation in the previous block's commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteInfo {
    pub address: ConsAddress,
    pub power: i64,
    pub signed_last_block: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastCommitInfo {
    pub round: u32,
    pub votes: Vec<VoteInfo>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvidenceKind {
    DuplicateVote,
}

/// Misbehaviour reported by the consensus engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub kind: EvidenceKind,
    pub address: ConsAddress,
    pub power: i64,
    pub height: u64,
    pub time: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInitChain {
    pub time: u64,
    pub chain_id: String,
    /// Validator set the consensus engine expects; empty means "trust the app".
    pub validators: Vec<ValidatorUpdate>,
    pub app_state_bytes: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseInitChain {
    pub validators: Vec<ValidatorUpdate>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestBeginBlock {
    pub hash: Vec<u8>,
    pub header: BlockHeader,
    pub last_commit_info: LastCommitInfo,
    pub byzantine_validators: Vec<Evidence>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBeginBlock {
    pub tags: Tags,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEndBlock {
    pub height: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEndBlock {
    pub validator_updates: Vec<ValidatorUpdate>,
    pub tags: Tags,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseDeliverTx {
    pub code: u32,
    pub codespace: String,
    pub log: String,
    pub gas_wanted: u64,
    pub gas_used: u64,
    pub tags: Tags,
}

impl ResponseDeliverTx {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

/// `check_tx` shares the delivery record shape.
pub type ResponseCheckTx = ResponseDeliverTx;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestQuery {
    pub path: String,
    pub data: Vec<u8>,
    pub height: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseQuery {
    pub code: u32,
    pub codespace: String,
    pub log: String,
    pub value: Vec<u8>,
    pub height: u64,
}

impl ResponseQuery {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCommit {
    /// App hash over the committed state.
    pub data: Vec<u8>,
}
