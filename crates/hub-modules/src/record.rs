//! On-chain data records.
//!
//! A record stores submitted bytes under an id derived from the submitter,
//! the block and the content hash, so identical data submitted twice in the
//! same block by the same account collides and is rejected.

use std::sync::Arc;

use hub_crypto::ContentHasher;
use hub_store::{Context, StoreKey};
use hub_types::{AccAddress, Tags};
use serde::{Deserialize, Serialize};

use crate::error::{codespace, ModuleError, ModuleResult};
use crate::handler::{handler_fn, json_response, querier_fn, Handler, HandlerResult, Querier};
use crate::msg::Msg;

pub const CODE_INVALID_RECORD: u32 = 100;
pub const CODE_RECORD_EXISTS: u32 = 101;
pub const CODE_UNKNOWN_RECORD: u32 = 102;

pub const MAX_DESCRIPTION_LEN: usize = 100;
pub const MAX_DATA_LEN: usize = 1024;

const RECORD_HASHER: ContentHasher = ContentHasher::new("hub-record-v1");
const RECORD_PREFIX: &[u8] = b"records/";

fn record_key(id: &str) -> Vec<u8> {
    [RECORD_PREFIX, id.as_bytes()].concat()
}

fn record_error(code: u32, reason: impl Into<String>) -> ModuleError {
    ModuleError::rejected(codespace::RECORD, code, reason)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSubmitRecord {
    pub submitter: AccAddress,
    pub description: String,
    pub data: Vec<u8>,
}

impl MsgSubmitRecord {
    pub fn validate_basic(&self) -> ModuleResult<()> {
        if self.description.len() > MAX_DESCRIPTION_LEN {
            return Err(record_error(
                CODE_INVALID_RECORD,
                format!("description longer than {MAX_DESCRIPTION_LEN} bytes"),
            ));
        }
        if self.data.is_empty() || self.data.len() > MAX_DATA_LEN {
            return Err(record_error(
                CODE_INVALID_RECORD,
                format!("data must be 1-{MAX_DATA_LEN} bytes"),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub submitter: AccAddress,
    pub description: String,
    pub data_hash: String,
    pub data: Vec<u8>,
    pub submit_height: u64,
    pub submit_time: u64,
}

pub struct RecordKeeper {
    key: StoreKey,
}

impl RecordKeeper {
    pub fn new(key: StoreKey) -> Self {
        Self { key }
    }

    pub fn record(&self, ctx: &Context<'_>, id: &str) -> ModuleResult<Option<Record>> {
        Ok(ctx.get_value(&self.key, &record_key(id))?)
    }

    pub fn submit(&self, ctx: &mut Context<'_>, msg: &MsgSubmitRecord) -> ModuleResult<Record> {
        let data_hash = RECORD_HASHER.hash(&msg.data);
        let height = ctx.block_height().to_be_bytes();
        let id = hex::encode(RECORD_HASHER.hash_parts(&[
            msg.submitter.as_bytes().as_slice(),
            &height,
            &data_hash,
        ]));
        if ctx.has(&self.key, &record_key(&id))? {
            return Err(record_error(CODE_RECORD_EXISTS, format!("record {id} already exists")));
        }
        let record = Record {
            id,
            submitter: msg.submitter,
            description: msg.description.clone(),
            data_hash: hex::encode(data_hash),
            data: msg.data.clone(),
            submit_height: ctx.block_height(),
            submit_time: ctx.block_time(),
        };
        ctx.set_value(&self.key, &record_key(&record.id), &record)?;
        tracing::debug!(id = %record.id, submitter = %record.submitter, "record submitted");
        Ok(record)
    }
}

pub fn new_handler(keeper: Arc<RecordKeeper>) -> Handler {
    handler_fn(move |ctx, msg| match msg {
        Msg::SubmitRecord(m) => {
            let record = keeper.submit(ctx, m)?;
            Ok(HandlerResult::with_tags(Tags::new().with("record_id", record.id)))
        }
        other => Err(ModuleError::UnknownRequest(format!(
            "record cannot handle {}",
            other.kind()
        ))),
    })
}

/// Query path: `record/<id>`.
pub fn new_querier(keeper: Arc<RecordKeeper>) -> Querier {
    querier_fn(move |ctx, path, _data| match path {
        ["record", id] => match keeper.record(ctx, id)? {
            Some(record) => json_response(&record),
            None => Err(record_error(CODE_UNKNOWN_RECORD, format!("unknown record {id}"))),
        },
        _ => Err(ModuleError::UnknownRequest(format!(
            "unknown record query {}",
            path.join("/")
        ))),
    })
}

#[cfg(test)]
mod tests {
    use hub_store::{CommitMultiStore, StoreKeyRegistry};
    use hub_types::{BlockHeader, PubKey};

    use super::*;

    fn submit_msg(data: &[u8]) -> MsgSubmitRecord {
        MsgSubmitRecord {
            submitter: AccAddress::from_pubkey(&PubKey::from_bytes([4; 32])),
            description: "sample".into(),
            data: data.to_vec(),
        }
    }

    #[test]
    fn submit_then_query() {
        let mut keys = StoreKeyRegistry::new();
        let key = keys.register("record").unwrap();
        let keeper = Arc::new(RecordKeeper::new(key));
        let mut store = CommitMultiStore::mount(&keys);
        let header = BlockHeader {
            height: 7,
            ..BlockHeader::default()
        };
        let mut ctx = Context::new(&mut store, header);

        let handler = new_handler(Arc::clone(&keeper));
        let res = handler(&mut ctx, &Msg::SubmitRecord(submit_msg(b"payload"))).unwrap();
        let id = res.tags.get("record_id").unwrap().to_string();
        assert_eq!(id.len(), 64);

        let dup = handler(&mut ctx, &Msg::SubmitRecord(submit_msg(b"payload"))).unwrap_err();
        assert_eq!(dup.code(), CODE_RECORD_EXISTS);

        let querier = new_querier(keeper);
        let bytes = querier(&ctx, &["record", id.as_str()], &[]).unwrap();
        let record: Record = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(record.data, b"payload");
        assert_eq!(record.submit_height, 7);
        assert!(querier(&ctx, &["record", "missing"], &[]).is_err());
    }

    #[test]
    fn oversized_data_fails_basic_validation() {
        assert!(submit_msg(&[0; MAX_DATA_LEN + 1]).validate_basic().is_err());
        assert!(submit_msg(&[]).validate_basic().is_err());
        assert!(submit_msg(b"ok").validate_basic().is_ok());
    }
}
