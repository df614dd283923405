use hub_store::{StoreKey, StoreKeyRegistry, StoreResult};

/// Every store partition the application mounts.
#[derive(Clone, Debug)]
pub struct AppKeys {
    pub acc: StoreKey,
    pub fee: StoreKey,
    pub params: StoreKey,
    pub transient_params: StoreKey,
    pub stake: StoreKey,
    pub mint: StoreKey,
    pub distr: StoreKey,
    pub slashing: StoreKey,
    pub gov: StoreKey,
    pub service: StoreKey,
    pub guardian: StoreKey,
    pub record: StoreKey,
}

impl AppKeys {
    /// Issue the application's keys from `registry`. Called once at start.
    pub fn register(registry: &mut StoreKeyRegistry) -> StoreResult<Self> {
        Ok(Self {
            acc: registry.register("acc")?,
            fee: registry.register("fee")?,
            params: registry.register("params")?,
            transient_params: registry.register_transient("transient_params")?,
            stake: registry.register("stake")?,
            mint: registry.register("mint")?,
            distr: registry.register("distr")?,
            slashing: registry.register("slashing")?,
            gov: registry.register("gov")?,
            service: registry.register("service")?,
            guardian: registry.register("guardian")?,
            record: registry.register("record")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_each_partition_once() {
        let mut registry = StoreKeyRegistry::new();
        let keys = AppKeys::register(&mut registry).unwrap();
        assert_eq!(registry.len(), 12);
        assert!(keys.transient_params.is_transient());
        assert!(!keys.acc.is_transient());
        assert!(AppKeys::register(&mut registry).is_err());
    }
}
