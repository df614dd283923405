use hub_crypto::{Signature, SigningKey};
use hub_types::{AccAddress, Coins, PubKey};
use serde::{Deserialize, Serialize};

use crate::error::{ModuleError, ModuleResult};
use crate::msg::Msg;

pub const MAX_MEMO_CHARACTERS: usize = 100;

/// Fee offered by a transaction: coins paid up front and the gas limit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdFee {
    pub amount: Coins,
    pub gas: u64,
}

impl StdFee {
    pub fn new(amount: Coins, gas: u64) -> Self {
        Self { amount, gas }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdSignature {
    pub pub_key: PubKey,
    pub signature: Signature,
    pub account_number: u64,
    pub sequence: u64,
}

/// Standard transaction: messages, fee, one signature per signer, memo.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdTx {
    pub msgs: Vec<Msg>,
    pub fee: StdFee,
    pub signatures: Vec<StdSignature>,
    pub memo: String,
}

impl StdTx {
    /// Distinct signers in first-appearance order.
    pub fn signers(&self) -> Vec<AccAddress> {
        let mut signers: Vec<AccAddress> = Vec::new();
        for msg in &self.msgs {
            for signer in msg.signers() {
                if !signers.contains(&signer) {
                    signers.push(signer);
                }
            }
        }
        signers
    }

    /// The account that pays the fee.
    pub fn fee_payer(&self) -> Option<AccAddress> {
        self.msgs.first().and_then(|m| m.signers().into_iter().next())
    }

    pub fn validate_basic(&self) -> ModuleResult<()> {
        if self.msgs.is_empty() {
            return Err(ModuleError::UnknownRequest("tx carries no messages".into()));
        }
        if self.memo.chars().count() > MAX_MEMO_CHARACTERS {
            return Err(ModuleError::MemoTooLarge(self.memo.len()));
        }
        self.fee
            .amount
            .validate()
            .map_err(|e| ModuleError::InvalidCoins(e.to_string()))?;
        let signers = self.signers();
        if self.signatures.len() != signers.len() {
            return Err(ModuleError::Unauthorized(format!(
                "wrong number of signatures: expected {}, got {}",
                signers.len(),
                self.signatures.len()
            )));
        }
        for msg in &self.msgs {
            msg.validate_basic()?;
        }
        Ok(())
    }
}

/// The document each signer signs.
#[derive(Serialize)]
struct StdSignDoc<'a> {
    chain_id: &'a str,
    account_number: u64,
    sequence: u64,
    fee: &'a StdFee,
    msgs: &'a [Msg],
    memo: &'a str,
}

/// Canonical bytes a signer signs for `tx`.
pub fn sign_bytes(
    chain_id: &str,
    account_number: u64,
    sequence: u64,
    fee: &StdFee,
    msgs: &[Msg],
    memo: &str,
) -> ModuleResult<Vec<u8>> {
    let doc = StdSignDoc {
        chain_id,
        account_number,
        sequence,
        fee,
        msgs,
        memo,
    };
    serde_json::to_vec(&doc).map_err(|e| ModuleError::TxDecode(e.to_string()))
}

/// Binary transaction codec.
pub fn encode_tx(tx: &StdTx) -> ModuleResult<Vec<u8>> {
    bincode::serialize(tx).map_err(|e| ModuleError::TxDecode(e.to_string()))
}

pub fn decode_tx(bytes: &[u8]) -> ModuleResult<StdTx> {
    bincode::deserialize(bytes).map_err(|e| ModuleError::TxDecode(e.to_string()))
}

/// One signer's key with the account state it signs against.
pub struct TxSigner<'a> {
    pub key: &'a SigningKey,
    pub account_number: u64,
    pub sequence: u64,
}

/// Build a transaction signed by `signers`, in signer order.
pub fn build_signed_tx(
    chain_id: &str,
    msgs: Vec<Msg>,
    fee: StdFee,
    memo: &str,
    signers: &[TxSigner<'_>],
) -> ModuleResult<StdTx> {
    let mut signatures = Vec::with_capacity(signers.len());
    for signer in signers {
        let bytes = sign_bytes(
            chain_id,
            signer.account_number,
            signer.sequence,
            &fee,
            &msgs,
            memo,
        )?;
        signatures.push(StdSignature {
            pub_key: signer.key.pub_key(),
            signature: signer.key.sign(&bytes),
            account_number: signer.account_number,
            sequence: signer.sequence,
        });
    }
    Ok(StdTx {
        msgs,
        fee,
        signatures,
        memo: memo.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::MsgSend;

    fn send_tx(key: &SigningKey) -> StdTx {
        let to = AccAddress::from_pubkey(&PubKey::from_bytes([9; 32]));
        let msg = Msg::Send(MsgSend {
            from: key.address(),
            to,
            amount: Coins::single("airis", 10),
        });
        build_signed_tx(
            "hub-test",
            vec![msg],
            StdFee::new(Coins::empty(), 50_000),
            "",
            &[TxSigner {
                key,
                account_number: 0,
                sequence: 0,
            }],
        )
        .unwrap()
    }

    #[test]
    fn codec_preserves_tx() {
        let key = SigningKey::from_bytes([4; 32]);
        let tx = send_tx(&key);
        let decoded = decode_tx(&encode_tx(&tx).unwrap()).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let err = decode_tx(&[0xff, 0x01]).unwrap_err();
        assert!(matches!(err, ModuleError::TxDecode(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn missing_signature_rejected() {
        let key = SigningKey::from_bytes([4; 32]);
        let mut tx = send_tx(&key);
        tx.signatures.clear();
        assert!(matches!(tx.validate_basic(), Err(ModuleError::Unauthorized(_))));
    }

    #[test]
    fn long_memo_rejected() {
        let key = SigningKey::from_bytes([4; 32]);
        let mut tx = send_tx(&key);
        tx.memo = "m".repeat(MAX_MEMO_CHARACTERS + 1);
        assert!(matches!(tx.validate_basic(), Err(ModuleError::MemoTooLarge(_))));
    }
}
