//! Error types for chain scoring and mesh validation.

use logichain_core::CoreError;
use logichain_crypto::SignatureError;
use thiserror::Error;

/// Reasons a signed clock reading is rejected.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClockError {
    #[error("Clock skew {skew_secs:.1}s exceeds {max_secs:.1}s")]
    Skewed { skew_secs: f64, max_secs: f64 },

    #[error("Insufficient mesh validators: {have} (need {need})")]
    InsufficientValidators { have: usize, need: usize },

    #[error("Invalid clock signature: {0}")]
    Signature(#[from] SignatureError),
}

/// Errors raised while building or checking mesh artifacts.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Insufficient validators: {have} (need {need})")]
    InsufficientValidators { have: usize, need: usize },

    #[error("Hop distance too large: {hops} (max {max})")]
    HopDistanceTooLarge { hops: u32, max: u32 },

    #[error("Mesh proof too old: {age_secs:.1}s (max {max_secs:.1}s)")]
    StaleProof { age_secs: f64, max_secs: f64 },

    #[error("Proof hash mismatch")]
    ProofHashMismatch,

    #[error("Mesh PoW not found within {attempts} attempts")]
    PowExhausted { attempts: u64 },

    #[error("Mesh PoW cancelled")]
    PowCancelled,

    #[error("Unknown mesh node: {0}")]
    UnknownNode(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for mesh operations
pub type MeshResult<T> = std::result::Result<T, MeshError>;
