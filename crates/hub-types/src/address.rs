use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Length in bytes of every address kind.
pub const ADDRESS_LEN: usize = 20;

/// Ed25519 public key (32 bytes), hex-encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PubKey([u8; 32]);

impl PubKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        Ok(Self(decode_fixed::<32>(s)?))
    }
}

impl fmt::Debug for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PubKey({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for PubKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PubKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], TypeError> {
    let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
    if bytes.len() != N {
        return Err(TypeError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

fn derive_address(domain: &[u8], key: &PubKey) -> [u8; ADDRESS_LEN] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; ADDRESS_LEN];
    out.copy_from_slice(&digest.as_bytes()[..ADDRESS_LEN]);
    out
}

macro_rules! address_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; ADDRESS_LEN]);

        impl $name {
            /// Human-readable prefix used in the string form.
            pub const PREFIX: &'static str = $prefix;

            pub fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse `prefix:hex` or bare hex.
            pub fn parse(s: &str) -> Result<Self, TypeError> {
                let body = match s.split_once(':') {
                    Some((prefix, body)) if prefix == $prefix => body,
                    Some((prefix, _)) => {
                        return Err(TypeError::InvalidPrefix {
                            expected: $prefix.into(),
                            actual: prefix.into(),
                        })
                    }
                    None => s,
                };
                Ok(Self(decode_fixed::<ADDRESS_LEN>(body)?))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}:{})", stringify!($name), $prefix, hex::encode(&self.0[..4]))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", $prefix, self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

address_type!(
    /// Account address: owner of coins, signer of transactions.
    AccAddress,
    "acc"
);
address_type!(
    /// Validator operator address. Shares its bytes with the operator's account.
    ValAddress,
    "val"
);
address_type!(
    /// Consensus address, derived from a validator's consensus public key.
    ConsAddress,
    "cons"
);

impl AccAddress {
    pub fn from_pubkey(key: &PubKey) -> Self {
        Self(derive_address(b"hub-acc-v1:", key))
    }
}

impl ConsAddress {
    pub fn from_pubkey(key: &PubKey) -> Self {
        Self(derive_address(b"hub-cons-v1:", key))
    }
}

impl From<AccAddress> for ValAddress {
    fn from(addr: AccAddress) -> Self {
        Self(addr.0)
    }
}

impl From<ValAddress> for AccAddress {
    fn from(addr: ValAddress) -> Self {
        Self(addr.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let key = PubKey::from_bytes([7u8; 32]);
        assert_eq!(AccAddress::from_pubkey(&key), AccAddress::from_pubkey(&key));
        assert_ne!(
            AccAddress::from_pubkey(&key).as_bytes(),
            ConsAddress::from_pubkey(&key).as_bytes()
        );
    }

    #[test]
    fn display_and_parse() {
        let addr = AccAddress::from_bytes([0xab; ADDRESS_LEN]);
        let text = addr.to_string();
        assert!(text.starts_with("acc:"));
        assert_eq!(text.parse::<AccAddress>().unwrap(), addr);
        assert_eq!(AccAddress::parse(&addr.to_hex()).unwrap(), addr);
    }

    #[test]
    fn wrong_prefix_rejected() {
        let val = ValAddress::from_bytes([1; ADDRESS_LEN]);
        let err = AccAddress::parse(&val.to_string()).unwrap_err();
        assert!(matches!(err, TypeError::InvalidPrefix { .. }));
    }

    #[test]
    fn wrong_length_rejected() {
        let err = ConsAddress::parse("cons:abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: ADDRESS_LEN,
                actual: 2
            }
        );
    }

    #[test]
    fn operator_conversion_keeps_bytes() {
        let acc = AccAddress::from_bytes([9; ADDRESS_LEN]);
        let val = ValAddress::from(acc);
        assert_eq!(acc.as_bytes(), val.as_bytes());
        assert_eq!(AccAddress::from(val), acc);
    }

    #[test]
    fn serde_uses_string_form() {
        let key = PubKey::from_bytes([3; 32]);
        let addr = ConsAddress::from_pubkey(&key);
        let json = serde_json::to_string(&addr).unwrap();
        assert!(json.contains("cons:"));
        let back: ConsAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);

        let key_json = serde_json::to_string(&key).unwrap();
        let key_back: PubKey = serde_json::from_str(&key_json).unwrap();
        assert_eq!(key_back, key);
    }
}
