use hub_store::StoreError;

/// Codespaces attached to user-facing errors.
pub mod codespace {
    pub const SDK: &str = "sdk";
    pub const BANK: &str = "bank";
    pub const PARAMS: &str = "params";
    pub const STAKE: &str = "stake";
    pub const SLASHING: &str = "slashing";
    pub const DISTR: &str = "distr";
    pub const MINT: &str = "mint";
    pub const GOV: &str = "gov";
    pub const SERVICE: &str = "service";
    pub const GUARDIAN: &str = "guardian";
    pub const RECORD: &str = "record";
}

/// Errors raised by keepers, handlers, hooks and the ante pipeline.
///
/// Variants split into two classes. User-facing errors reject a single
/// transaction or query and leave the node running. Fatal errors
/// ([`ModuleError::is_fatal`]) mean the node's state can no longer be
/// trusted and must halt processing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleError {
    #[error("unrecognized message type: {0}")]
    UnknownRequest(String),

    #[error("tx parse error: {0}")]
    TxDecode(String),

    #[error("invalid sequence: expected {expected}, got {got}")]
    InvalidSequence { expected: u64, got: u64 },

    #[error("signature verification failed: {0}")]
    Unauthorized(String),

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: String, available: String },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("unknown address: {0}")]
    UnknownAddress(String),

    #[error("invalid coins: {0}")]
    InvalidCoins(String),

    #[error("out of gas in {descriptor}: limit {limit}, used {used}")]
    OutOfGas {
        descriptor: String,
        limit: u64,
        used: u64,
    },

    #[error("memo too large: {0} bytes")]
    MemoTooLarge(usize),

    #[error("insufficient fee: {0}")]
    InsufficientFee(String),

    /// Module-level validation failure.
    #[error("{reason}")]
    Rejected {
        codespace: &'static str,
        code: u32,
        reason: String,
    },

    // -- fatal --------------------------------------------------------------
    #[error("store contract violation: {0}")]
    Store(StoreError),

    #[error("staking hook {hook} failed: {reason}")]
    Hook { hook: String, reason: String },

    #[error("state corruption: {0}")]
    Corrupt(String),
}

impl ModuleError {
    pub fn rejected(codespace: &'static str, code: u32, reason: impl Into<String>) -> Self {
        Self::Rejected {
            codespace,
            code,
            reason: reason.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Hook { .. } | Self::Corrupt(_))
    }

    pub fn codespace(&self) -> &'static str {
        match self {
            Self::Rejected { codespace, .. } => codespace,
            _ => codespace::SDK,
        }
    }

    /// ABCI result code. Zero is reserved for success.
    pub fn code(&self) -> u32 {
        match self {
            Self::Store(_) | Self::Hook { .. } | Self::Corrupt(_) => 1,
            Self::TxDecode(_) => 2,
            Self::InvalidSequence { .. } => 3,
            Self::Unauthorized(_) => 4,
            Self::InsufficientFunds { .. } => 5,
            Self::UnknownRequest(_) => 6,
            Self::InvalidAddress(_) => 7,
            Self::UnknownAddress(_) => 9,
            Self::InvalidCoins(_) => 11,
            Self::OutOfGas { .. } => 12,
            Self::MemoTooLarge(_) => 13,
            Self::InsufficientFee(_) => 14,
            Self::Rejected { code, .. } => *code,
        }
    }
}

impl From<StoreError> for ModuleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OutOfGas {
                descriptor,
                limit,
                used,
            } => Self::OutOfGas {
                descriptor,
                limit,
                used,
            },
            other => Self::Store(other),
        }
    }
}

/// Result alias for module operations.
pub type ModuleResult<T> = Result<T, ModuleError>;
