use std::collections::BTreeMap;

use hub_crypto::{merkle_root, ContentHasher, Digest};

use crate::error::{StoreError, StoreResult};
use crate::key::{StoreKey, StoreKeyRegistry};
use crate::traits::{KvStore, MultiStore};

/// In-memory, BTreeMap-backed partition.
#[derive(Clone, Debug, Default)]
pub struct MemKvStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Digest of every entry in key order.
    pub fn digest(&self) -> Digest {
        let mut hasher_input = Vec::new();
        for (k, v) in &self.entries {
            hasher_input.extend_from_slice(&(k.len() as u64).to_be_bytes());
            hasher_input.extend_from_slice(k);
            hasher_input.extend_from_slice(&(v.len() as u64).to_be_bytes());
            hasher_input.extend_from_slice(v);
        }
        ContentHasher::PARTITION.hash(&hasher_input)
    }
}

impl KvStore for MemKvStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) {
        self.entries.insert(key.to_vec(), value);
    }

    fn delete(&mut self, key: &[u8]) {
        self.entries.remove(key);
    }

    fn has(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Result of a commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitInfo {
    pub version: u64,
    pub app_hash: Digest,
}

/// Root multi-store holding one partition per mounted key.
///
/// Writes land directly; [`CommitMultiStore::commit`] clears transient
/// partitions and computes the app hash over persistent ones.
#[derive(Debug)]
pub struct CommitMultiStore {
    registry_id: u64,
    stores: BTreeMap<StoreKey, MemKvStore>,
    last_commit: CommitInfo,
}

impl CommitMultiStore {
    /// Mount a partition for every key in `registry`.
    pub fn mount(registry: &StoreKeyRegistry) -> Self {
        let stores = registry
            .keys()
            .map(|key| (key.clone(), MemKvStore::new()))
            .collect();
        Self {
            registry_id: registry.id(),
            stores,
            last_commit: CommitInfo {
                version: 0,
                app_hash: [0u8; 32],
            },
        }
    }

    pub fn last_commit(&self) -> CommitInfo {
        self.last_commit
    }

    /// Hash of the persistent partitions as they stand now.
    pub fn working_hash(&self) -> Digest {
        let leaves: Vec<Digest> = self
            .stores
            .iter()
            .filter(|(key, _)| !key.is_transient())
            .map(|(key, store)| {
                ContentHasher::PARTITION.hash_parts(&[key.name().as_bytes(), &store.digest()])
            })
            .collect();
        merkle_root(&leaves)
    }

    /// Seal the current state as the next version.
    pub fn commit(&mut self) -> CommitInfo {
        for (key, store) in self.stores.iter_mut() {
            if key.is_transient() {
                store.clear();
            }
        }
        let info = CommitInfo {
            version: self.last_commit.version + 1,
            app_hash: self.working_hash(),
        };
        self.last_commit = info;
        tracing::debug!(
            version = info.version,
            app_hash = %hex_prefix(&info.app_hash),
            "multi-store committed"
        );
        info
    }

    fn partition(&self, key: &StoreKey) -> StoreResult<&MemKvStore> {
        self.check_key(key)?;
        self.stores
            .get(key)
            .ok_or_else(|| StoreError::UnknownStoreKey(key.name().to_string()))
    }

    fn partition_mut(&mut self, key: &StoreKey) -> StoreResult<&mut MemKvStore> {
        self.check_key(key)?;
        self.stores
            .get_mut(key)
            .ok_or_else(|| StoreError::UnknownStoreKey(key.name().to_string()))
    }
}

fn hex_prefix(digest: &Digest) -> String {
    digest[..6].iter().map(|b| format!("{b:02x}")).collect()
}

impl MultiStore for CommitMultiStore {
    fn check_key(&self, key: &StoreKey) -> StoreResult<()> {
        if key.registry_id() != self.registry_id {
            return Err(StoreError::ForeignKey(key.name().to_string()));
        }
        if !self.stores.contains_key(key) {
            return Err(StoreError::UnknownStoreKey(key.name().to_string()));
        }
        Ok(())
    }

    fn get(&self, key: &StoreKey, k: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.partition(key)?.get(k))
    }

    fn set(&mut self, key: &StoreKey, k: &[u8], value: Vec<u8>) -> StoreResult<()> {
        self.partition_mut(key)?.set(k, value);
        Ok(())
    }

    fn delete(&mut self, key: &StoreKey, k: &[u8]) -> StoreResult<()> {
        self.partition_mut(key)?.delete(k);
        Ok(())
    }

    fn prefix_scan(&self, key: &StoreKey, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self.partition(key)?.prefix_scan(prefix))
    }
}
