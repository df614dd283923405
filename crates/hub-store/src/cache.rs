use std::collections::BTreeMap;

use crate::error::StoreResult;
use crate::key::StoreKey;
use crate::traits::MultiStore;

type Overlay = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// Write-buffering branch over a parent multi-store.
///
/// Reads see buffered writes first. Nothing reaches the parent until
/// [`CacheMultiStore::write`]; dropping the branch discards it.
pub struct CacheMultiStore<'a> {
    parent: &'a mut dyn MultiStore,
    writes: BTreeMap<StoreKey, Overlay>,
}

impl<'a> CacheMultiStore<'a> {
    pub fn new(parent: &'a mut dyn MultiStore) -> Self {
        Self {
            parent,
            writes: BTreeMap::new(),
        }
    }

    /// Number of buffered writes and deletes.
    pub fn pending(&self) -> usize {
        self.writes.values().map(BTreeMap::len).sum()
    }

    /// Flush buffered writes to the parent in key order.
    pub fn write(self) -> StoreResult<()> {
        let Self { parent, writes } = self;
        for (key, overlay) in writes {
            for (k, value) in overlay {
                match value {
                    Some(v) => parent.set(&key, &k, v)?,
                    None => parent.delete(&key, &k)?,
                }
            }
        }
        Ok(())
    }
}

impl MultiStore for CacheMultiStore<'_> {
    fn check_key(&self, key: &StoreKey) -> StoreResult<()> {
        self.parent.check_key(key)
    }

    fn get(&self, key: &StoreKey, k: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.check_key(key)?;
        if let Some(buffered) = self.writes.get(key).and_then(|o| o.get(k)) {
            return Ok(buffered.clone());
        }
        self.parent.get(key, k)
    }

    fn set(&mut self, key: &StoreKey, k: &[u8], value: Vec<u8>) -> StoreResult<()> {
        self.check_key(key)?;
        self.writes
            .entry(key.clone())
            .or_default()
            .insert(k.to_vec(), Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &StoreKey, k: &[u8]) -> StoreResult<()> {
        self.check_key(key)?;
        self.writes
            .entry(key.clone())
            .or_default()
            .insert(k.to_vec(), None);
        Ok(())
    }

    fn prefix_scan(&self, key: &StoreKey, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.parent.prefix_scan(key, prefix)?.into_iter().collect();
        if let Some(overlay) = self.writes.get(key) {
            for (k, value) in overlay.range(prefix.to_vec()..) {
                if !k.starts_with(prefix) {
                    break;
                }
                match value {
                    Some(v) => {
                        merged.insert(k.clone(), v.clone());
                    }
                    None => {
                        merged.remove(k);
                    }
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::StoreKeyRegistry;
    use crate::memory::CommitMultiStore;

    fn setup() -> (CommitMultiStore, StoreKey) {
        let mut registry = StoreKeyRegistry::new();
        let key = registry.register("bank").unwrap();
        (CommitMultiStore::mount(&registry), key)
    }

    #[test]
    fn dropped_branch_leaves_parent_untouched() {
        let (mut root, key) = setup();
        root.set(&key, b"a", vec![1]).unwrap();
        {
            let mut cache = CacheMultiStore::new(&mut root);
            cache.set(&key, b"a", vec![2]).unwrap();
            cache.set(&key, b"b", vec![3]).unwrap();
            assert_eq!(cache.get(&key, b"a").unwrap(), Some(vec![2]));
        }
        assert_eq!(root.get(&key, b"a").unwrap(), Some(vec![1]));
        assert_eq!(root.get(&key, b"b").unwrap(), None);
    }

    #[test]
    fn write_flushes_sets_and_deletes() {
        let (mut root, key) = setup();
        root.set(&key, b"a", vec![1]).unwrap();
        let mut cache = CacheMultiStore::new(&mut root);
        cache.delete(&key, b"a").unwrap();
        cache.set(&key, b"b", vec![2]).unwrap();
        assert_eq!(cache.pending(), 2);
        cache.write().unwrap();
        assert_eq!(root.get(&key, b"a").unwrap(), None);
        assert_eq!(root.get(&key, b"b").unwrap(), Some(vec![2]));
    }

    #[test]
    fn prefix_scan_merges_overlay() {
        let (mut root, key) = setup();
        root.set(&key, b"p/1", vec![1]).unwrap();
        root.set(&key, b"p/2", vec![2]).unwrap();
        let mut cache = CacheMultiStore::new(&mut root);
        cache.delete(&key, b"p/1").unwrap();
        cache.set(&key, b"p/3", vec![3]).unwrap();
        cache.set(&key, b"q/1", vec![9]).unwrap();
        let keys: Vec<Vec<u8>> = cache
            .prefix_scan(&key, b"p/")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"p/2".to_vec(), b"p/3".to_vec()]);
    }
}
