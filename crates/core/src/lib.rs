//! Core types and primitives for the LogiChain consensus layer.
//!
//! This crate provides the chain snapshot types, consensus rule
//! configuration, legacy-compatible hashing, Merkle roots and the bounded
//! proof-of-work search shared by the mesh and dual-mode miners.

pub mod config;
pub mod error;
pub mod hashing;
pub mod logging;
pub mod merkle;
pub mod pow;
pub mod time;
pub mod types;

pub use config::{
    ChainScoreConfig, ChallengeConfig, ConsensusConfig, DoubleSpendConfig, ForkConfig,
    MaintenanceConfig, MeshConfig, MiningConfig, MiningProfile, PodConfig, TransitionConfig,
};
pub use error::{CoreError, Result};
pub use hashing::{canonical_json, canonical_json_of, sha256, sha256_hex};
pub use merkle::{merkle_proof, merkle_root, verify_merkle_proof, MerkleProof, ProofStep};
pub use pow::{meets_difficulty, search_nonce, MAX_DIFFICULTY, PowOutcome, SearchParams};
pub use time::{legacy_timestamp, unix_now, Timestamp};
pub use types::{Block, ChainError, ChainInfo, ConnectivityMode};

/// Re-exported so callers can cancel searches without naming tokio-util.
pub use tokio_util::sync::CancellationToken;
