use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Lifetime class of a store partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKind {
    /// Survives commits.
    Persistent,
    /// Wiped at every commit; block-scoped scratch space.
    Transient,
}

/// Opaque capability granting access to one named store partition.
///
/// Keys are only minted by a [`StoreKeyRegistry`]. Two keys with the same
/// name from different registries compare unequal.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey {
    name: Arc<str>,
    registry: u64,
    kind: StoreKind,
}

impl StoreKey {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub fn is_transient(&self) -> bool {
        self.kind == StoreKind::Transient
    }

    pub(crate) fn registry_id(&self) -> u64 {
        self.registry
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StoreKind::Persistent => write!(f, "StoreKey({})", self.name),
            StoreKind::Transient => write!(f, "TransientStoreKey({})", self.name),
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Issues store keys once at process start.
///
/// Names are unique within a registry; issued keys are never revoked.
pub struct StoreKeyRegistry {
    id: u64,
    keys: BTreeMap<String, StoreKey>,
}

impl StoreKeyRegistry {
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            keys: BTreeMap::new(),
        }
    }

    /// Issue a persistent key.
    pub fn register(&mut self, name: &str) -> StoreResult<StoreKey> {
        self.issue(name, StoreKind::Persistent)
    }

    /// Issue a transient key.
    pub fn register_transient(&mut self, name: &str) -> StoreResult<StoreKey> {
        self.issue(name, StoreKind::Transient)
    }

    fn issue(&mut self, name: &str, kind: StoreKind) -> StoreResult<StoreKey> {
        if self.keys.contains_key(name) {
            return Err(StoreError::DuplicateKey(name.to_string()));
        }
        let key = StoreKey {
            name: Arc::from(name),
            registry: self.id,
            kind,
        };
        self.keys.insert(name.to_string(), key.clone());
        tracing::debug!(store = name, ?kind, "store key registered");
        Ok(key)
    }

    pub fn get(&self, name: &str) -> Option<&StoreKey> {
        self.keys.get(name)
    }

    /// `true` if `key` was issued by this registry.
    pub fn contains(&self, key: &StoreKey) -> bool {
        key.registry == self.id && self.keys.get(key.name()) == Some(key)
    }

    /// All keys in name order.
    pub fn keys(&self) -> impl Iterator<Item = &StoreKey> {
        self.keys.values()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

impl Default for StoreKeyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StoreKeyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreKeyRegistry")
            .field("id", &self.id)
            .field("keys", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}
