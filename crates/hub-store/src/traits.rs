use crate::error::StoreResult;
use crate::key::StoreKey;

/// A single ordered key-value partition.
pub trait KvStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    fn set(&mut self, key: &[u8], value: Vec<u8>);

    fn delete(&mut self, key: &[u8]);

    fn has(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// All entries whose key starts with `prefix`, in ascending key order.
    fn prefix_scan(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>;
}

/// A set of partitions addressed by [`StoreKey`].
///
/// Every operation fails if the key was not mounted on this store or was
/// issued by a foreign registry.
pub trait MultiStore {
    /// Verify that `key` addresses a mounted partition.
    fn check_key(&self, key: &StoreKey) -> StoreResult<()>;

    fn get(&self, key: &StoreKey, k: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    fn set(&mut self, key: &StoreKey, k: &[u8], value: Vec<u8>) -> StoreResult<()>;

    fn delete(&mut self, key: &StoreKey, k: &[u8]) -> StoreResult<()>;

    fn prefix_scan(&self, key: &StoreKey, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>>;
}
