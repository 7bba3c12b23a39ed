//! Trust Mesh
//!
//! This crate implements the evidence side of LogiChain consensus:
//! - Chain trust scoring from mesh attestations, quorum votes and latency
//! - Signed clock validation
//! - Mesh proofs (validator attestations bounded by hop distance)
//! - Mesh block hashing, lightweight PoW and validation
//! - Mesh node reputation tracking

pub mod chain_score;
pub mod error;
pub mod mesh_block;
pub mod mesh_proof;
pub mod registry;

pub use chain_score::{ChainScore, ChainScoreValidator, SignedClock};
pub use error::{ClockError, MeshError, MeshResult};
pub use mesh_block::{
    calculate_mesh_transaction_hash, MeshBlock, MeshBlockHeader, MeshHasher, MeshValidation,
    MESH_BLOCK_VERSION, MESH_MODE,
};
pub use mesh_proof::{proof_hash, MeshProof, MeshProofManager};
pub use registry::{MeshNode, MeshNodeRegistry, REPUTATION_PENALTY, REPUTATION_REWARD};
