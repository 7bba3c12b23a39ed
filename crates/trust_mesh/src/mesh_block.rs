//! Mesh blocks: blocks assembled offline over the radio mesh.
//!
//! # Architecture
//!
//! ```text
//! tx ──canonical json──► sha256 ──► "{tx_hash}-{sorted validators joined '-'}" ──► sha256
//!                                                                           │
//!                                               merkle root over all mesh tx hashes
//!                                                                           │
//! header {version, previous_hash, merkle_root, timestamp, validator_count, mode, nonce}
//!                                                                           │
//!               sha256(canonical_json(header) + floor(now / 300)) starts with "00"
//! ```
//!
//! The PoW is deliberately weak so constrained hardware can mine it. Its
//! hash is salted with the current five-minute window, so a block mined near
//! a window boundary stops validating once the window rolls over. Legacy
//! peers depend on this framing.

use crate::error::{MeshError, MeshResult};
use logichain_core::config::MeshConfig;
use logichain_core::hashing::{canonical_json, canonical_json_of, sha256_hex};
use logichain_core::merkle::merkle_root;
use logichain_core::pow::{meets_difficulty, search_nonce, PowOutcome, SearchParams};
use logichain_core::time::{unix_now, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Header version written by this node.
pub const MESH_BLOCK_VERSION: u32 = 1;

/// Mode tag carried in every mesh header.
pub const MESH_MODE: &str = "mesh";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshBlockHeader {
    pub version: u32,
    pub previous_hash: String,
    pub merkle_root: String,
    /// Whole Unix seconds
    pub timestamp: i64,
    pub validator_count: usize,
    pub mode: String,
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshBlock {
    pub header: MeshBlockHeader,
    pub transactions: Vec<Value>,
    pub validators: Vec<String>,
    pub mesh_hash: String,
}

/// Outcome of [`MeshHasher::validate_mesh_block`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshValidation {
    Valid,
    InsufficientValidators { have: usize, need: usize },
    InvalidBlockHash,
    InvalidMerkleRoot,
    InvalidPow,
    /// Header or transactions could not be canonicalized
    Malformed(String),
}

impl MeshValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, MeshValidation::Valid)
    }
}

impl fmt::Display for MeshValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshValidation::Valid => write!(f, "Valid mesh block"),
            MeshValidation::InsufficientValidators { .. } => write!(f, "Insufficient validators"),
            MeshValidation::InvalidBlockHash => write!(f, "Invalid block hash"),
            MeshValidation::InvalidMerkleRoot => write!(f, "Invalid merkle root"),
            MeshValidation::InvalidPow => write!(f, "Invalid mesh PoW"),
            MeshValidation::Malformed(reason) => write!(f, "Malformed mesh block: {}", reason),
        }
    }
}

/// Mesh hash of one transaction, bound to the attesting validator set.
///
/// Validator order does not matter; the set is sorted before joining.
pub fn calculate_mesh_transaction_hash(transaction: &Value, validators: &[String]) -> MeshResult<String> {
    let tx_hash = sha256_hex(canonical_json(transaction)?);
    let mut sorted: Vec<&str> = validators.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    Ok(sha256_hex(format!("{}-{}", tx_hash, sorted.join("-"))))
}

fn salted_header_hash(header: &MeshBlockHeader, window: i64) -> logichain_core::Result<String> {
    let mut preimage = canonical_json_of(header)?;
    preimage.push_str(&window.to_string());
    Ok(sha256_hex(preimage))
}

fn transactions_root(transactions: &[Value], validators: &[String]) -> MeshResult<String> {
    let hashes = transactions
        .iter()
        .map(|tx| calculate_mesh_transaction_hash(tx, validators))
        .collect::<MeshResult<Vec<_>>>()?;
    Ok(merkle_root(&hashes))
}

/// Builds and checks mesh blocks.
#[derive(Debug, Clone)]
pub struct MeshHasher {
    difficulty: u32,
    window_secs: u64,
    pow_timeout: Duration,
    required_validators: usize,
}

impl MeshHasher {
    pub fn new(config: &MeshConfig) -> Self {
        Self {
            difficulty: config.pow_difficulty,
            window_secs: config.pow_window_secs.max(1),
            pow_timeout: Duration::from_secs(config.pow_timeout_secs),
            required_validators: config.required_validators,
        }
    }

    pub fn required_validators(&self) -> usize {
        self.required_validators
    }

    fn salt_window(&self, now: Timestamp) -> i64 {
        (now / self.window_secs as f64).floor() as i64
    }

    /// `sha256(canonical_json(header) + window)` for the window containing `now`.
    pub fn mesh_block_hash_at(&self, header: &MeshBlockHeader, now: Timestamp) -> MeshResult<String> {
        Ok(salted_header_hash(header, self.salt_window(now))?)
    }

    pub fn create_mesh_block(
        &self,
        transactions: Vec<Value>,
        validators: Vec<String>,
        previous_hash: &str,
        cancel: &CancellationToken,
    ) -> MeshResult<MeshBlock> {
        self.create_mesh_block_at(transactions, validators, previous_hash, cancel, unix_now())
    }

    /// Assemble a mesh block and mine its lightweight PoW.
    ///
    /// The salt window is fixed at `now` for the whole search.
    ///
    /// # Errors
    /// `PowExhausted` on timeout, `PowCancelled` when `cancel` fires.
    pub fn create_mesh_block_at(
        &self,
        transactions: Vec<Value>,
        validators: Vec<String>,
        previous_hash: &str,
        cancel: &CancellationToken,
        now: Timestamp,
    ) -> MeshResult<MeshBlock> {
        let header = MeshBlockHeader {
            version: MESH_BLOCK_VERSION,
            previous_hash: previous_hash.to_string(),
            merkle_root: transactions_root(&transactions, &validators)?,
            timestamp: now.floor() as i64,
            validator_count: validators.len(),
            mode: MESH_MODE.to_string(),
            nonce: 0,
        };

        let window = self.salt_window(now);
        let params = SearchParams::single(self.difficulty, self.pow_timeout);
        let outcome = search_nonce(&params, cancel, |nonce| {
            let mut candidate = header.clone();
            candidate.nonce = nonce;
            salted_header_hash(&candidate, window)
        })?;

        let (nonce, mesh_hash) = match outcome {
            PowOutcome::Found { nonce, hash, .. } => (nonce, hash),
            PowOutcome::TimedOut { attempts } => return Err(MeshError::PowExhausted { attempts }),
            PowOutcome::Cancelled { .. } => return Err(MeshError::PowCancelled),
        };

        debug!(
            nonce,
            transactions = transactions.len(),
            validators = validators.len(),
            "Mesh block mined"
        );

        Ok(MeshBlock {
            header: MeshBlockHeader { nonce, ..header },
            transactions,
            validators,
            mesh_hash,
        })
    }

    pub fn validate_mesh_block(&self, block: &MeshBlock, required_validators: usize) -> MeshValidation {
        self.validate_mesh_block_at(block, required_validators, unix_now())
    }

    /// Check validator count, block hash, Merkle root and PoW, in that order.
    pub fn validate_mesh_block_at(
        &self,
        block: &MeshBlock,
        required_validators: usize,
        now: Timestamp,
    ) -> MeshValidation {
        let verdict = self.check_block(block, required_validators, now);
        if !verdict.is_valid() {
            warn!(
                previous_hash = %block.header.previous_hash,
                reason = %verdict,
                "Mesh block rejected"
            );
        }
        verdict
    }

    fn check_block(&self, block: &MeshBlock, required_validators: usize, now: Timestamp) -> MeshValidation {
        if block.validators.len() < required_validators {
            return MeshValidation::InsufficientValidators {
                have: block.validators.len(),
                need: required_validators,
            };
        }

        let hash = match self.mesh_block_hash_at(&block.header, now) {
            Ok(hash) => hash,
            Err(e) => return MeshValidation::Malformed(e.to_string()),
        };
        if hash != block.mesh_hash {
            return MeshValidation::InvalidBlockHash;
        }

        match transactions_root(&block.transactions, &block.validators) {
            Ok(root) if root == block.header.merkle_root => {}
            Ok(_) => return MeshValidation::InvalidMerkleRoot,
            Err(e) => return MeshValidation::Malformed(e.to_string()),
        }

        if !meets_difficulty(&hash, self.difficulty) {
            return MeshValidation::InvalidPow;
        }

        MeshValidation::Valid
    }
}

impl Default for MeshHasher {
    fn default() -> Self {
        Self::new(&MeshConfig::default())
    }
}
