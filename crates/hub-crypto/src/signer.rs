use hub_types::{AccAddress, PubKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ed25519 signing key (private).
pub struct SigningKey(ed25519_dalek::SigningKey);

/// Ed25519 signature, hex-encoded on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

impl SigningKey {
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Deterministic key from a 32-byte seed (tests, fixtures).
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&bytes))
    }

    pub fn pub_key(&self) -> PubKey {
        PubKey::from_bytes(self.0.verifying_key().to_bytes())
    }

    /// Account address owned by this key.
    pub fn address(&self) -> AccAddress {
        AccAddress::from_pubkey(&self.pub_key())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        use ed25519_dalek::Signer;
        Signature(self.0.sign(message))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(<redacted>)")
    }
}

impl Signature {
    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, SignatureError> {
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidSignature)?;
        Ok(Self(ed25519_dalek::Signature::from_bytes(&arr)))
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}...)", hex::encode(&self.0.to_bytes()[..8]))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0.to_bytes()))
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Self::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Verify `signature` over `message` by `key`.
pub fn verify(key: &PubKey, message: &[u8], signature: &Signature) -> Result<(), SignatureError> {
    use ed25519_dalek::Verifier;
    let vk = ed25519_dalek::VerifyingKey::from_bytes(key.as_bytes())
        .map_err(|_| SignatureError::InvalidKey)?;
    vk.verify(message, &signature.0)
        .map_err(|_| SignatureError::InvalidSignature)
}

/// Errors from signing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid key")]
    InvalidKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let sk = SigningKey::generate();
        let sig = sk.sign(b"hello");
        assert!(verify(&sk.pub_key(), b"hello", &sig).is_ok());
        assert_eq!(
            verify(&sk.pub_key(), b"other", &sig),
            Err(SignatureError::InvalidSignature)
        );
    }

    #[test]
    fn wrong_key_fails() {
        let a = SigningKey::from_bytes([1; 32]);
        let b = SigningKey::from_bytes([2; 32]);
        let sig = a.sign(b"message");
        assert!(verify(&b.pub_key(), b"message", &sig).is_err());
    }

    #[test]
    fn seeded_keys_are_stable() {
        let a = SigningKey::from_bytes([5; 32]);
        let b = SigningKey::from_bytes([5; 32]);
        assert_eq!(a.pub_key(), b.pub_key());
        assert_eq!(a.address(), AccAddress::from_pubkey(&b.pub_key()));
    }

    #[test]
    fn signature_serde_is_hex() {
        let sk = SigningKey::from_bytes([9; 32]);
        let sig = sk.sign(b"test");
        let json = serde_json::to_string(&sig).unwrap();
        assert_eq!(json.len(), 128 + 2);
        let parsed: Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, sig);
    }

    #[test]
    fn debug_redacts_signing_key() {
        let sk = SigningKey::generate();
        assert!(format!("{sk:?}").contains("redacted"));
    }
}
