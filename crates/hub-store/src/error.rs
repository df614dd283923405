/// Errors from store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The key was never mounted on this multi-store.
    #[error("store key not mounted: {0}")]
    UnknownStoreKey(String),

    /// The key was issued by a different registry than the one mounted.
    #[error("store key {0} was issued by a foreign registry")]
    ForeignKey(String),

    /// The current context is not permitted to touch this partition.
    #[error("access to store {0} is not permitted in this context")]
    KeyNotPermitted(String),

    /// A registry already issued a key with this name.
    #[error("store key already registered: {0}")]
    DuplicateKey(String),

    #[error("out of gas in {descriptor}: limit {limit}, used {used}")]
    OutOfGas {
        descriptor: String,
        limit: u64,
        used: u64,
    },

    /// Stored bytes could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl StoreError {
    /// Out-of-gas is the caller's fault; everything else means the node
    /// itself is misconfigured or its state is corrupt.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::OutOfGas { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
