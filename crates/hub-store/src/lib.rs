//! Capability-scoped key-value storage for the Hub application engine.
//!
//! Application state lives in named partitions, each addressed by an opaque
//! [`StoreKey`] issued once by a [`StoreKeyRegistry`]. Handlers never see the
//! multi-store directly: they receive a [`Context`] that may be scoped to the
//! keys they declared, so a message handler cannot touch a partition it was
//! not granted.
//!
//! # Key Types
//!
//! - [`StoreKeyRegistry`] / [`StoreKey`]: issuing and holding partition capabilities
//! - [`MultiStore`]: the partition-addressed storage trait
//! - [`CommitMultiStore`]: in-memory root store with commit and app hash
//! - [`CacheMultiStore`]: write-buffering branch
//! - [`GasMeter`]: per-execution gas accounting
//! - [`Context`]: the view handed to handlers and lifecycle steps

pub mod cache;
pub mod codec;
pub mod context;
pub mod error;
pub mod gas;
pub mod key;
pub mod memory;
pub mod traits;

pub use cache::CacheMultiStore;
pub use context::Context;
pub use error::{StoreError, StoreResult};
pub use gas::{GasConfig, GasMeter};
pub use key::{StoreKey, StoreKeyRegistry, StoreKind};
pub use memory::{CommitInfo, CommitMultiStore, MemKvStore};
pub use traits::{KvStore, MultiStore};
