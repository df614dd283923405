use std::collections::BTreeSet;
use std::rc::Rc;

use hub_types::{BlockHeader, ConsAddress};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::CacheMultiStore;
use crate::codec;
use crate::error::{StoreError, StoreResult};
use crate::gas::{GasConfig, GasMeter};
use crate::key::StoreKey;
use crate::traits::MultiStore;

/// Execution context handed to every handler, hook, and lifecycle step.
///
/// Carries the current block header, a gas meter, and a view of the
/// multi-store. A context may be *scoped* to a subset of store keys; any
/// access outside that subset fails with [`StoreError::KeyNotPermitted`].
pub struct Context<'a> {
    store: &'a mut dyn MultiStore,
    header: BlockHeader,
    gas: Rc<GasMeter>,
    gas_config: GasConfig,
    permitted: Option<Rc<BTreeSet<StoreKey>>>,
    check_tx: bool,
}

impl<'a> Context<'a> {
    pub fn new(store: &'a mut dyn MultiStore, header: BlockHeader) -> Self {
        Self {
            store,
            header,
            gas: Rc::new(GasMeter::infinite()),
            gas_config: GasConfig::KV,
            permitted: None,
            check_tx: false,
        }
    }

    pub fn with_gas_meter(mut self, meter: GasMeter) -> Self {
        self.gas = Rc::new(meter);
        self
    }

    pub fn with_check_tx(mut self, check_tx: bool) -> Self {
        self.check_tx = check_tx;
        self
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn block_height(&self) -> u64 {
        self.header.height
    }

    pub fn block_time(&self) -> u64 {
        self.header.time
    }

    pub fn chain_id(&self) -> &str {
        &self.header.chain_id
    }

    pub fn proposer(&self) -> Option<&ConsAddress> {
        self.header.proposer.as_ref()
    }

    pub fn gas_meter(&self) -> &GasMeter {
        &self.gas
    }

    pub fn is_check_tx(&self) -> bool {
        self.check_tx
    }

    /// `true` if this context may touch `key`.
    pub fn is_permitted(&self, key: &StoreKey) -> bool {
        self.permitted.as_ref().map_or(true, |set| set.contains(key))
    }

    fn guard(&self, key: &StoreKey) -> StoreResult<()> {
        if !self.is_permitted(key) {
            tracing::error!(store = key.name(), "store access outside permitted scope");
            return Err(StoreError::KeyNotPermitted(key.name().to_string()));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Raw access
    // -----------------------------------------------------------------------

    pub fn get(&self, key: &StoreKey, k: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.guard(key)?;
        self.gas.consume(self.gas_config.read_cost_flat, "read flat")?;
        let value = self.store.get(key, k)?;
        if let Some(v) = &value {
            self.gas.consume(
                self.gas_config.read_cost_per_byte * v.len() as u64,
                "read per byte",
            )?;
        }
        Ok(value)
    }

    pub fn has(&self, key: &StoreKey, k: &[u8]) -> StoreResult<bool> {
        self.guard(key)?;
        self.gas.consume(self.gas_config.has_cost, "has")?;
        Ok(self.store.get(key, k)?.is_some())
    }

    pub fn set(&mut self, key: &StoreKey, k: &[u8], value: Vec<u8>) -> StoreResult<()> {
        self.guard(key)?;
        self.gas.consume(self.gas_config.write_cost_flat, "write flat")?;
        self.gas.consume(
            self.gas_config.write_cost_per_byte * value.len() as u64,
            "write per byte",
        )?;
        self.store.set(key, k, value)
    }

    pub fn delete(&mut self, key: &StoreKey, k: &[u8]) -> StoreResult<()> {
        self.guard(key)?;
        self.gas.consume(self.gas_config.delete_cost, "delete")?;
        self.store.delete(key, k)
    }

    pub fn prefix_scan(
        &self,
        key: &StoreKey,
        prefix: &[u8],
    ) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.guard(key)?;
        let entries = self.store.prefix_scan(key, prefix)?;
        self.gas.consume(
            self.gas_config.iter_next_cost * entries.len() as u64,
            "iterator next",
        )?;
        Ok(entries)
    }

    // -----------------------------------------------------------------------
    // Typed access
    // -----------------------------------------------------------------------

    pub fn get_value<T: DeserializeOwned>(&self, key: &StoreKey, k: &[u8]) -> StoreResult<Option<T>> {
        match self.get(key, k)? {
            Some(bytes) => codec::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn set_value<T: Serialize>(&mut self, key: &StoreKey, k: &[u8], value: &T) -> StoreResult<()> {
        let bytes = codec::encode(value)?;
        self.set(key, k, bytes)
    }

    pub fn scan_values<T: DeserializeOwned>(
        &self,
        key: &StoreKey,
        prefix: &[u8],
    ) -> StoreResult<Vec<(Vec<u8>, T)>> {
        self.prefix_scan(key, prefix)?
            .into_iter()
            .map(|(k, v)| codec::decode(&v).map(|value| (k, value)))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Derived contexts
    // -----------------------------------------------------------------------

    /// A context restricted to `keys`. Nested scopes intersect.
    pub fn scoped(&mut self, keys: &[StoreKey]) -> Context<'_> {
        let requested: BTreeSet<StoreKey> = keys.iter().cloned().collect();
        let permitted = match &self.permitted {
            Some(outer) => requested.intersection(outer).cloned().collect(),
            None => requested,
        };
        Context {
            store: &mut *self.store,
            header: self.header.clone(),
            gas: Rc::clone(&self.gas),
            gas_config: self.gas_config,
            permitted: Some(Rc::new(permitted)),
            check_tx: self.check_tx,
        }
    }

    /// A context over the same store charging `meter` instead of the
    /// current gas meter.
    pub fn metered(&mut self, meter: GasMeter) -> Context<'_> {
        Context {
            store: &mut *self.store,
            header: self.header.clone(),
            gas: Rc::new(meter),
            gas_config: self.gas_config,
            permitted: self.permitted.clone(),
            check_tx: self.check_tx,
        }
    }

    /// Run `f` against a cache branch whose writes are always dropped.
    pub fn sandbox<T, F>(&mut self, f: F) -> T
    where
        F: FnOnce(&mut Context<'_>) -> T,
    {
        let mut cache = CacheMultiStore::new(&mut *self.store);
        let mut child = Context {
            store: &mut cache,
            header: self.header.clone(),
            gas: Rc::clone(&self.gas),
            gas_config: self.gas_config,
            permitted: self.permitted.clone(),
            check_tx: self.check_tx,
        };
        f(&mut child)
    }

    /// Run `f` against a cache branch, flushing its writes only on success.
    ///
    /// Gas consumed inside the branch is charged either way.
    pub fn branch<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Context<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let header = self.header.clone();
        let gas = Rc::clone(&self.gas);
        let permitted = self.permitted.clone();
        let mut cache = CacheMultiStore::new(&mut *self.store);
        let result = {
            let mut child = Context {
                store: &mut cache,
                header,
                gas,
                gas_config: self.gas_config,
                permitted,
                check_tx: self.check_tx,
            };
            f(&mut child)
        };
        match result {
            Ok(value) => {
                cache.write()?;
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::StoreKeyRegistry;
    use crate::memory::CommitMultiStore;

    struct Fixture {
        store: CommitMultiStore,
        acc: StoreKey,
        stake: StoreKey,
    }

    fn fixture() -> Fixture {
        let mut registry = StoreKeyRegistry::new();
        let acc = registry.register("acc").unwrap();
        let stake = registry.register("stake").unwrap();
        Fixture {
            store: CommitMultiStore::mount(&registry),
            acc,
            stake,
        }
    }

    #[test]
    fn scoped_context_rejects_other_keys() {
        let mut fx = fixture();
        let mut ctx = Context::new(&mut fx.store, BlockHeader::default());
        let mut scoped = ctx.scoped(&[fx.acc.clone()]);
        scoped.set(&fx.acc, b"a", vec![1]).unwrap();
        assert_eq!(
            scoped.set(&fx.stake, b"s", vec![1]).unwrap_err(),
            StoreError::KeyNotPermitted("stake".into())
        );
        assert!(scoped.get(&fx.stake, b"s").unwrap_err().is_fatal());
    }

    #[test]
    fn nested_scopes_intersect() {
        let mut fx = fixture();
        let mut ctx = Context::new(&mut fx.store, BlockHeader::default());
        let mut outer = ctx.scoped(&[fx.acc.clone()]);
        let inner = outer.scoped(&[fx.acc.clone(), fx.stake.clone()]);
        assert!(inner.is_permitted(&fx.acc));
        assert!(!inner.is_permitted(&fx.stake));
    }

    #[test]
    fn failed_branch_discards_writes() {
        let mut fx = fixture();
        let acc = fx.acc.clone();
        let mut ctx = Context::new(&mut fx.store, BlockHeader::default());
        let result: Result<(), StoreError> = ctx.branch(|c| {
            c.set(&acc, b"x", vec![1])?;
            Err(StoreError::Codec("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(ctx.get(&acc, b"x").unwrap(), None);

        ctx.branch(|c| c.set(&acc, b"y", vec![2])).unwrap();
        assert_eq!(ctx.get(&acc, b"y").unwrap(), Some(vec![2]));
    }

    #[test]
    fn gas_is_charged_and_limited() {
        let mut fx = fixture();
        let acc = fx.acc.clone();
        let mut ctx =
            Context::new(&mut fx.store, BlockHeader::default()).with_gas_meter(GasMeter::new(2500));
        ctx.set(&acc, b"k", vec![0; 10]).unwrap();
        assert_eq!(ctx.gas_meter().consumed(), 2000 + 300);
        let err = ctx.set(&acc, b"k2", vec![0]).unwrap_err();
        assert!(matches!(err, StoreError::OutOfGas { .. }));
    }

    #[test]
    fn typed_values_round_trip_through_store() {
        let mut fx = fixture();
        let stake = fx.stake.clone();
        let mut ctx = Context::new(&mut fx.store, BlockHeader::default());
        ctx.set_value(&stake, b"v/1", &(7u64, "val".to_string())).unwrap();
        let got: Option<(u64, String)> = ctx.get_value(&stake, b"v/1").unwrap();
        assert_eq!(got, Some((7, "val".to_string())));
        let all: Vec<(Vec<u8>, (u64, String))> = ctx.scan_values(&stake, b"v/").unwrap();
        assert_eq!(all.len(), 1);
    }
    #[test]
    fn metered_context_charges_its_own_meter() {
        let mut fx = fixture();
        let acc = fx.acc.clone();
        let mut ctx = Context::new(&mut fx.store, BlockHeader::default());
        let consumed = {
            let tx_ctx = ctx.metered(GasMeter::new(10_000));
            tx_ctx.has(&acc, b"k").unwrap();
            tx_ctx.gas_meter().consumed()
        };
        assert_eq!(consumed, 10);
        assert_eq!(ctx.gas_meter().consumed(), 0);
    }

    #[test]
    fn sandbox_never_flushes() {
        let mut fx = fixture();
        let acc = fx.acc.clone();
        let mut ctx = Context::new(&mut fx.store, BlockHeader::default());
        let seen = ctx.sandbox(|c| {
            c.set(&acc, b"x", vec![1]).unwrap();
            c.get(&acc, b"x").unwrap()
        });
        assert_eq!(seen, Some(vec![1]));
        assert_eq!(ctx.get(&acc, b"x").unwrap(), None);
    }
}
