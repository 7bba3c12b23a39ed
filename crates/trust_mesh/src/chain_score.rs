//! Chain trust scoring.
//!
//! Converts the evidence a chain segment carries (mesh validator
//! attestations, quorum votes, block age) into a single trust score, and
//! validates signed clock readings exchanged over the mesh.
//!
//! # Scoring
//!
//! - `latency_penalty = min(1, mean(max(0, (now - ts) * factor)))`
//! - `mesh_score = min(1, validators / (blocks * min_mesh_validators))`
//! - `quorum_score = min(1, votes / (blocks * min_quorum_votes))`
//! - `total = (1 - latency_penalty) * (mesh * w_mesh + quorum * w_quorum)`
//!
//! A chain is suspicious when any single threshold is breached.

use crate::error::ClockError;
use logichain_core::config::ChainScoreConfig;
use logichain_core::time::{legacy_timestamp, unix_now, Timestamp};
use logichain_core::types::{Block, ChainError};
use logichain_crypto::{sign_message, verify_signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Trust metric for one chain segment. Sub-scores lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChainScore {
    pub total_score: f64,
    pub latency_penalty: f64,
    pub mesh_score: f64,
    pub quorum_score: f64,
}

/// A timestamp signed by a node and attested by mesh validators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedClock {
    pub timestamp: Timestamp,
    pub node_id: String,
    pub signature: Vec<u8>,
    pub mesh_validators: Vec<String>,
}

impl SignedClock {
    /// Sign `timestamp` as `node_id`.
    pub fn sign(
        node_id: &str,
        timestamp: Timestamp,
        mesh_validators: Vec<String>,
        key: &SigningKey,
    ) -> Self {
        let signature = sign_message(key, &clock_message(timestamp, node_id));
        Self {
            timestamp,
            node_id: node_id.to_string(),
            signature,
            mesh_validators,
        }
    }
}

fn clock_message(timestamp: Timestamp, node_id: &str) -> Vec<u8> {
    format!("{}:{}", legacy_timestamp(timestamp), node_id).into_bytes()
}

/// Scores chains and checks signed clocks.
#[derive(Debug, Clone)]
pub struct ChainScoreValidator {
    config: ChainScoreConfig,
}

impl ChainScoreValidator {
    pub fn new(config: ChainScoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChainScoreConfig {
        &self.config
    }

    /// Score a chain segment as of `now`.
    ///
    /// # Errors
    /// `ChainError::Empty` when `blocks` is empty; an empty segment carries
    /// no evidence to score.
    pub fn calculate_chain_score(&self, blocks: &[Block], now: Timestamp) -> Result<ChainScore, ChainError> {
        if blocks.is_empty() {
            return Err(ChainError::Empty);
        }

        let count = blocks.len() as f64;
        let mut total_latency = 0.0;
        let mut total_mesh_validators = 0usize;
        let mut total_quorum_votes = 0usize;

        for block in blocks {
            let latency = now - block.timestamp;
            total_latency += (latency * self.config.latency_penalty_factor).max(0.0);
            total_mesh_validators += block.mesh_validators.len();
            total_quorum_votes += block.quorum_votes.len();
        }

        let mesh_score = (total_mesh_validators as f64
            / (count * self.config.min_mesh_validators as f64))
            .min(1.0);
        let quorum_score =
            (total_quorum_votes as f64 / (count * self.config.min_quorum_votes as f64)).min(1.0);
        let latency_penalty = (total_latency / count).clamp(0.0, 1.0);

        let weighted =
            mesh_score * self.config.mesh_weight + quorum_score * self.config.quorum_weight;
        let total_score = (1.0 - latency_penalty) * weighted;

        Ok(ChainScore {
            total_score,
            latency_penalty,
            mesh_score,
            quorum_score,
        })
    }

    /// True when any threshold is breached.
    pub fn is_chain_suspicious(&self, score: &ChainScore) -> bool {
        score.total_score < self.config.min_total_score
            || score.latency_penalty > self.config.max_latency_penalty
            || score.mesh_score < self.config.min_mesh_score
            || score.quorum_score < self.config.min_quorum_score
    }

    /// Validate a signed clock reading against the signer's key.
    pub fn validate_signed_clock(&self, clock: &SignedClock, key: &VerifyingKey) -> Result<(), ClockError> {
        self.validate_signed_clock_at(clock, key, unix_now())
    }

    pub fn validate_signed_clock_at(
        &self,
        clock: &SignedClock,
        key: &VerifyingKey,
        now: Timestamp,
    ) -> Result<(), ClockError> {
        let skew = (now - clock.timestamp).abs();
        if skew.is_nan() || skew > self.config.max_acceptable_latency_secs {
            return Err(ClockError::Skewed {
                skew_secs: skew,
                max_secs: self.config.max_acceptable_latency_secs,
            });
        }

        if clock.mesh_validators.len() < self.config.min_mesh_validators {
            return Err(ClockError::InsufficientValidators {
                have: clock.mesh_validators.len(),
                need: self.config.min_mesh_validators,
            });
        }

        verify_signature(
            key,
            &clock_message(clock.timestamp, &clock.node_id),
            &clock.signature,
        )?;

        debug!(node_id = %clock.node_id, skew_secs = skew, "Signed clock accepted");
        Ok(())
    }
}

impl Default for ChainScoreValidator {
    fn default() -> Self {
        Self::new(ChainScoreConfig::default())
    }
}
