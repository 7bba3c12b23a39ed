//! Node identity verification for LogiChain.
//!
//! Every peer must prove possession of its identity key before the consensus
//! layer accepts transactions, blocks or votes from it.
//!
//! # Security Model
//!
//! All identity operations must be:
//! - Cryptographically verifiable (Ed25519 over legacy-framed messages)
//! - Single use (a challenge is consumed by its first valid response)
//! - Time bounded (challenge timeout, verification cache window)
//! - Logged

pub mod challenge;
pub mod error;

pub use challenge::{
    generate_proof, Challenge, CleanupStats, NodeChallengeProtocol, Response, NONCE_LENGTH,
};
pub use error::{ChallengeError, ChallengeResult};
