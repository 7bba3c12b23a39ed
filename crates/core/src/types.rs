//! Chain data handed to the consensus core by block producers and storage.
//!
//! These are read-only snapshots: the fork resolver and chain scorer never
//! mutate them, and ingestion publishes a new `ChainInfo` rather than editing
//! one in place.

use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Connectivity mode a node or chain segment operated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityMode {
    /// Fully connected network
    Online,
    /// Partitioned, radio-linked mesh
    Offline,
}

impl ConnectivityMode {
    /// Lowercase label used inside hashed block data.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectivityMode::Online => "online",
            ConnectivityMode::Offline => "offline",
        }
    }
}

impl fmt::Display for ConnectivityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityMode::Online => write!(f, "ONLINE"),
            ConnectivityMode::Offline => write!(f, "OFFLINE"),
        }
    }
}

/// One block of a candidate chain, reduced to what consensus inspects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block hash (hex)
    pub hash: String,
    /// Hash of the parent block (hex)
    pub previous_hash: String,
    /// Block timestamp (Unix seconds)
    pub timestamp: Timestamp,
    /// Difficulty the block was mined at
    pub difficulty: u64,
    /// Validators attesting the block over the mesh
    #[serde(default)]
    pub mesh_validators: Vec<String>,
    /// Quorum votes collected for the block
    #[serde(default)]
    pub quorum_votes: Vec<String>,
}

/// Structural problems in a chain snapshot.
#[derive(Debug, Error, PartialEq)]
pub enum ChainError {
    #[error("Broken link at height {height}: expected parent {expected}, got {actual}")]
    BrokenLink {
        height: usize,
        expected: String,
        actual: String,
    },

    #[error("Non-finite timestamp at height {height}")]
    InvalidTimestamp { height: usize },

    #[error("Chain has no blocks")]
    Empty,
}

/// A candidate chain segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainInfo {
    /// Ordered blocks, oldest first
    pub blocks: Vec<Block>,
    /// Cumulative difficulty over `blocks`
    pub total_difficulty: u64,
    /// Quorum votes backing the chain tip
    pub quorum_votes: u32,
    /// Mode the chain was produced in
    pub mode: ConnectivityMode,
    /// Timestamp of the last block (Unix seconds)
    pub last_block_time: Timestamp,
}

impl ChainInfo {
    /// Build a chain snapshot, deriving cumulative difficulty and tip time.
    pub fn new(blocks: Vec<Block>, quorum_votes: u32, mode: ConnectivityMode) -> Self {
        let total_difficulty = blocks.iter().map(|b| b.difficulty).sum();
        let last_block_time = blocks.last().map(|b| b.timestamp).unwrap_or(0.0);
        Self {
            blocks,
            total_difficulty,
            quorum_votes,
            mode,
            last_block_time,
        }
    }

    /// Number of blocks in the segment.
    pub fn height(&self) -> usize {
        self.blocks.len()
    }

    /// Check parent links and timestamps.
    ///
    /// An empty chain is structurally valid here; scoring rejects it
    /// separately.
    pub fn validate(&self) -> Result<(), ChainError> {
        for (height, block) in self.blocks.iter().enumerate() {
            if !block.timestamp.is_finite() {
                return Err(ChainError::InvalidTimestamp { height });
            }
            if height > 0 {
                let parent = &self.blocks[height - 1];
                if block.previous_hash != parent.hash {
                    return Err(ChainError::BrokenLink {
                        height,
                        expected: parent.hash.clone(),
                        actual: block.previous_hash.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
