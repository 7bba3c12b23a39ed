//! Core error types

use thiserror::Error;

/// Core error type for LogiChain
#[derive(Debug, Error)]
pub enum CoreError {
    /// Rule configuration rejected by validation
    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Canonical serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Merkle proof requested for an index outside the leaf set
    #[error("Leaf index {index} out of range for {len} leaves")]
    LeafIndexOutOfRange { index: usize, len: usize },

    /// A worker panicked while holding shared state
    #[error("Internal state poisoned: {0}")]
    StatePoisoned(String),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
