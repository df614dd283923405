//! Parameter storage and the explicit registry of governed parameters.
//!
//! Values live in the `params` store as JSON under `<subspace>/<key>`. Every
//! write is also recorded in the transient store so other modules can tell
//! whether a parameter changed during the current block.

use std::collections::BTreeMap;
use std::sync::RwLock;

use hub_store::{Context, StoreKey};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{codespace, ModuleError, ModuleResult};

pub const CODE_UNKNOWN_PARAM: u32 = 1;
pub const CODE_INVALID_PARAM: u32 = 2;

fn param_key(subspace: &str, key: &str) -> Vec<u8> {
    format!("{subspace}/{key}").into_bytes()
}

/// Owner of the parameter store and its transient change log.
#[derive(Clone, Debug)]
pub struct ParamsKeeper {
    key: StoreKey,
    tkey: StoreKey,
}

impl ParamsKeeper {
    pub fn new(key: StoreKey, tkey: StoreKey) -> Self {
        Self { key, tkey }
    }

    pub fn subspace(&self, name: &'static str) -> Subspace {
        Subspace {
            name,
            key: self.key.clone(),
            tkey: self.tkey.clone(),
        }
    }

    pub fn store_key(&self) -> &StoreKey {
        &self.key
    }

    /// Write a raw JSON value into any subspace. Used by governance to apply
    /// parameter-change proposals.
    pub fn set_raw(&self, ctx: &mut Context<'_>, subspace: &str, key: &str, bytes: Vec<u8>) -> ModuleResult<()> {
        write_param(ctx, &self.key, &self.tkey, subspace, key, bytes)
    }

    pub fn get_raw(&self, ctx: &Context<'_>, subspace: &str, key: &str) -> ModuleResult<Option<Vec<u8>>> {
        Ok(ctx.get(&self.key, &param_key(subspace, key))?)
    }
}

fn write_param(
    ctx: &mut Context<'_>,
    key: &StoreKey,
    tkey: &StoreKey,
    subspace: &str,
    param: &str,
    bytes: Vec<u8>,
) -> ModuleResult<()> {
    let k = param_key(subspace, param);
    ctx.set(key, &k, bytes)?;
    ctx.set(tkey, &k, vec![1])?;
    Ok(())
}

/// A named slice of the parameter store.
#[derive(Clone, Debug)]
pub struct Subspace {
    name: &'static str,
    key: StoreKey,
    tkey: StoreKey,
}

impl Subspace {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get<T: DeserializeOwned>(&self, ctx: &Context<'_>, key: &str) -> ModuleResult<Option<T>> {
        match self.get_raw(ctx, key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| ModuleError::Corrupt(format!("param {}/{key}: {e}", self.name))),
            None => Ok(None),
        }
    }

    /// Read a parameter, falling back to `default` when unset.
    pub fn get_or<T: DeserializeOwned>(&self, ctx: &Context<'_>, key: &str, default: T) -> ModuleResult<T> {
        Ok(self.get(ctx, key)?.unwrap_or(default))
    }

    pub fn get_raw(&self, ctx: &Context<'_>, key: &str) -> ModuleResult<Option<Vec<u8>>> {
        Ok(ctx.get(&self.key, &param_key(self.name, key))?)
    }

    pub fn set<T: Serialize>(&self, ctx: &mut Context<'_>, key: &str, value: &T) -> ModuleResult<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| ModuleError::Corrupt(format!("param {}/{key}: {e}", self.name)))?;
        self.set_raw(ctx, key, bytes)
    }

    pub fn set_raw(&self, ctx: &mut Context<'_>, key: &str, bytes: Vec<u8>) -> ModuleResult<()> {
        write_param(ctx, &self.key, &self.tkey, self.name, key, bytes)
    }

    /// `true` if the parameter was written during the current block.
    pub fn has_changed(&self, ctx: &Context<'_>, key: &str) -> ModuleResult<bool> {
        Ok(ctx.has(&self.tkey, &param_key(self.name, key))?)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Errors raised while building the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("parameter subspace already registered: {0}")]
    DuplicateSubspace(String),

    #[error("parameter {subspace}/{key} declared twice")]
    DuplicateParam { subspace: String, key: String },
}

type Check = Box<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

struct ParamSpec {
    key: &'static str,
    gov_changeable: bool,
    check: Check,
}

/// Typed declaration of one subspace's parameters.
pub struct ParamTable {
    subspace: &'static str,
    params: Vec<ParamSpec>,
}

impl ParamTable {
    pub fn new(subspace: &'static str) -> Self {
        Self {
            subspace,
            params: Vec::new(),
        }
    }

    /// Declare a parameter of type `T`. `check` runs on every proposed value.
    pub fn param<T>(mut self, key: &'static str, gov_changeable: bool, check: fn(&T) -> Result<(), String>) -> Self
    where
        T: DeserializeOwned + 'static,
    {
        let check: Check = Box::new(move |raw: &str| {
            let value: T = serde_json::from_str(raw).map_err(|e| e.to_string())?;
            check(&value)
        });
        self.params.push(ParamSpec {
            key,
            gov_changeable,
            check,
        });
        self
    }

    pub fn subspace(&self) -> &'static str {
        self.subspace
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Accept any value that parses.
pub fn any_value<T>(_: &T) -> Result<(), String> {
    Ok(())
}

/// Explicit registry of typed parameter tables, built once during protocol
/// load and shared by `Arc`.
#[derive(Default)]
pub struct ParamRegistry {
    tables: RwLock<BTreeMap<&'static str, ParamTable>>,
}

impl ParamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, table: ParamTable) -> Result<(), RegistryError> {
        let mut seen = std::collections::BTreeSet::new();
        for spec in &table.params {
            if !seen.insert(spec.key) {
                return Err(RegistryError::DuplicateParam {
                    subspace: table.subspace.to_string(),
                    key: spec.key.to_string(),
                });
            }
        }
        let mut tables = self.tables.write().expect("lock poisoned");
        if tables.contains_key(table.subspace) {
            return Err(RegistryError::DuplicateSubspace(table.subspace.to_string()));
        }
        tracing::debug!(subspace = table.subspace, params = table.len(), "param table registered");
        tables.insert(table.subspace, table);
        Ok(())
    }

    pub fn is_registered(&self, subspace: &str) -> bool {
        self.tables.read().expect("lock poisoned").contains_key(subspace)
    }

    /// `(subspace, key)` pairs governance may change, in registry order.
    pub fn gov_changeable(&self) -> Vec<(String, String)> {
        let tables = self.tables.read().expect("lock poisoned");
        tables
            .values()
            .flat_map(|t| {
                t.params
                    .iter()
                    .filter(|p| p.gov_changeable)
                    .map(|p| (t.subspace.to_string(), p.key.to_string()))
            })
            .collect()
    }

    /// Check a proposed governance change against its declaration.
    pub fn validate_change(&self, subspace: &str, key: &str, value: &str) -> ModuleResult<()> {
        let tables = self.tables.read().expect("lock poisoned");
        let spec = tables
            .get(subspace)
            .and_then(|t| t.params.iter().find(|p| p.key == key))
            .filter(|p| p.gov_changeable)
            .ok_or_else(|| {
                ModuleError::rejected(
                    codespace::PARAMS,
                    CODE_UNKNOWN_PARAM,
                    format!("parameter {subspace}/{key} is not governable"),
                )
            })?;
        (spec.check)(value).map_err(|reason| {
            ModuleError::rejected(
                codespace::PARAMS,
                CODE_INVALID_PARAM,
                format!("invalid value for {subspace}/{key}: {reason}"),
            )
        })
    }
}

impl std::fmt::Debug for ParamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subspaces: Vec<&str> = self
            .tables
            .read()
            .map(|t| t.keys().copied().collect())
            .unwrap_or_default();
        f.debug_struct("ParamRegistry").field("subspaces", &subspaces).finish()
    }
}
