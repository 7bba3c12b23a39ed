//! Error types for node identity verification.

use logichain_crypto::SignatureError;
use thiserror::Error;

/// Reasons a challenge or response is rejected.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChallengeError {
    /// No open challenge with this id (never issued, expired and purged,
    /// or already consumed by an earlier response)
    #[error("Unknown or consumed challenge: {challenge_id}")]
    UnknownChallenge { challenge_id: String },

    /// The challenge is older than the response window
    #[error("Challenge {challenge_id} expired after {age_secs:.1}s")]
    Expired { challenge_id: String, age_secs: f64 },

    /// Responder is not the node the challenge was issued to
    #[error("Node mismatch: challenge issued to {expected}, response from {actual}")]
    NodeMismatch { expected: String, actual: String },

    /// Proof is not the double hash of the challenge nonce
    #[error("Proof does not match challenge nonce")]
    InvalidProof,

    /// Signature over the framed message did not verify
    #[error("Invalid signature: {0}")]
    Signature(#[from] SignatureError),

    /// Malformed request
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for challenge operations
pub type ChallengeResult<T> = std::result::Result<T, ChallengeError>;
