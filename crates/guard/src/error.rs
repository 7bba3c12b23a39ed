//! Error types for admission guards and mode transitions.

use logichain_core::CoreError;
use logichain_crypto::SignatureError;
use thiserror::Error;

/// Malformed spend requests.
///
/// Detections (double spend, blacklist, nonce reuse) are not errors; they
/// come back as [`crate::double_spend::SpendAttempt`] values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpendError {
    #[error("Invalid spend input: {0}")]
    InvalidInput(String),

    #[error("Transaction {0} has no inputs")]
    NoInputs(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),
}

/// Result type for double-spend operations
pub type SpendResult<T> = Result<T, SpendError>;

/// Reasons a proof of delivery is rejected.
#[derive(Debug, Error)]
pub enum PodError {
    #[error("POD timestamp outside window: {age_secs:.1}s from now (max {max_secs:.1}s)")]
    StaleTimestamp { age_secs: f64, max_secs: f64 },

    #[error("POD replay detected: {pod_id}")]
    Replay { pod_id: String },

    #[error("Invalid driver signature: {0}")]
    DriverSignature(SignatureError),

    #[error("Invalid client signature: {0}")]
    ClientSignature(SignatureError),

    #[error("Malformed POD: {0}")]
    Malformed(String),

    #[error("Invalid Bloom filter parameters: {0}")]
    InvalidFilter(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for POD operations
pub type PodResult<T> = Result<T, PodError>;

/// Reasons a connectivity-mode transition is refused.
///
/// A refused transition never changes state.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Block {block_hash} has {have} confirmations (need {need})")]
    InsufficientConfirmations {
        block_hash: String,
        have: u64,
        need: u64,
    },

    #[error("Offline for {elapsed_secs:.0}s (max {max_secs:.0}s)")]
    OfflineTooLong { elapsed_secs: f64, max_secs: f64 },

    #[error("Duplicate offline operation id: {0}")]
    DuplicateOperation(String),

    #[error("Invalid offline operation {id}: {reason}")]
    InvalidOperation { id: String, reason: String },

    #[error("Signature from unregistered validator: {0}")]
    UnknownSigner(String),

    #[error("Invalid signature from {node_id}: {source}")]
    InvalidSignature {
        node_id: String,
        source: SignatureError,
    },

    #[error("Insufficient signatures: {have} (need {need})")]
    InsufficientSignatures { have: usize, need: usize },

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for transition operations
pub type TransitionResult<T> = Result<T, TransitionError>;
