use std::path::PathBuf;

use hub_modules::{ModuleError, RegistryError};
use hub_store::StoreError;
use hub_types::ValidatorSetMismatch;

use crate::genesis::BootstrapPhase;

/// Errors after which the node's state can no longer be trusted.
///
/// The binary logs these and exits non-zero.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("malformed genesis document: {0}")]
    MalformedGenesis(String),

    #[error("invalid genesis state: {0}")]
    InvalidGenesis(ModuleError),

    #[error("genesis step {step} failed: {source}")]
    GenesisStep {
        step: &'static str,
        #[source]
        source: ModuleError,
    },

    #[error("genesis transaction {index} rejected: code {code} ({codespace}): {log}")]
    GenesisTx {
        index: usize,
        code: u32,
        codespace: String,
        log: String,
    },

    #[error("validator set mismatch: {0}")]
    ValidatorSetMismatch(#[from] ValidatorSetMismatch),

    #[error("bootstrap cannot move from {from:?} to {to:?}")]
    Bootstrap { from: BootstrapPhase, to: BootstrapPhase },

    #[error("no protocol version active at height {0}")]
    NoProtocol(u64),

    #[error("chain is not initialized")]
    NotInitialized,

    /// A previous call failed fatally; the app refuses further work.
    #[error("node halted after fatal error: {0}")]
    Halted(String),

    #[error("{0}")]
    Module(ModuleError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

impl From<StoreError> for FatalError {
    fn from(err: StoreError) -> Self {
        Self::Module(ModuleError::Store(err))
    }
}

pub type FatalResult<T> = Result<T, FatalError>;

/// Route registration failures. Raised while a protocol version loads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    #[error("route {0} already registered")]
    DuplicateRoute(String),

    #[error("route name {0:?} must be non-empty and alphanumeric")]
    InvalidRouteName(String),

    #[error("route {route} requires store key {key} not issued by this registry")]
    UnknownStoreKey { route: String, key: String },
}

/// Startup wiring failures: everything that can go wrong before the first
/// block.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Params(#[from] RegistryError),

    #[error("protocol version {0} registered twice")]
    DuplicateVersion(u64),

    #[error("protocol versions {existing} and {incoming} share activation height {height}")]
    DuplicateActivation { existing: u64, incoming: u64, height: u64 },

    #[error("staking hooks already attached")]
    HooksAlreadySet,

    #[error("protocol version {0} is not loaded")]
    NotLoaded(u64),
}

/// Configuration file failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
