//! Cryptographic primitives for the Hub application engine.
//!
//! Domain-separated BLAKE3 hashing, Ed25519 transaction signatures, and the
//! Merkle root used for the app hash. All crypto wraps established libraries.

pub mod hasher;
pub mod merkle;
pub mod signer;

pub use hasher::{ContentHasher, Digest, HasherError};
pub use merkle::merkle_root;
pub use signer::{verify, Signature, SignatureError, SigningKey};
