/// A 32-byte BLAKE3 digest.
pub type Digest = [u8; 32];

/// Domain-separated BLAKE3 hasher.
///
/// The domain tag is prepended to every computation so that a transaction's
/// sign bytes and a store partition with identical bytes never collide.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Sign documents for transactions.
    pub const SIGN_DOC: Self = Self {
        domain: "hub-sign-doc-v1",
    };
    /// Encoded transaction bytes (tx hash).
    pub const TX: Self = Self { domain: "hub-tx-v1" };
    /// One store partition's contents.
    pub const PARTITION: Self = Self {
        domain: "hub-partition-v1",
    };
    /// Inner nodes of the app-hash tree.
    pub const NODE: Self = Self {
        domain: "hub-node-v1",
    };

    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    pub fn hash(&self, data: &[u8]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// Hash several length-prefixed parts as one message.
    pub fn hash_parts(&self, parts: &[&[u8]]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        for part in parts {
            hasher.update(&(part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        *hasher.finalize().as_bytes()
    }

    /// Hash a serializable value as JSON.
    pub fn hash_json<T: serde::Serialize>(&self, value: &T) -> Result<Digest, HasherError> {
        let data =
            serde_json::to_vec(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
        Ok(self.hash(&data))
    }

    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn different_domains_differ() {
        let data = b"same content";
        assert_ne!(ContentHasher::TX.hash(data), ContentHasher::SIGN_DOC.hash(data));
    }

    #[test]
    fn parts_are_length_prefixed() {
        let h = ContentHasher::PARTITION;
        assert_ne!(h.hash_parts(&[b"ab", b"c"]), h.hash_parts(&[b"a", b"bc"]));
    }

    #[test]
    fn hash_json_is_deterministic() {
        let value = serde_json::json!({"chain_id": "hub-test", "sequence": 3});
        let a = ContentHasher::SIGN_DOC.hash_json(&value).unwrap();
        let b = ContentHasher::SIGN_DOC.hash_json(&value).unwrap();
        assert_eq!(a, b);
    }
}
