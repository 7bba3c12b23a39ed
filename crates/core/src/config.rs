//! Consensus rule parameters.
//!
//! Loaded once at startup (genesis rules) and shared read-only by every
//! component of the consensus engine. Every section falls back to its
//! defaults, so a rules file only needs to list what it overrides.

use crate::error::{CoreError, Result};
use crate::pow::MAX_DIFFICULTY;
use serde::{Deserialize, Serialize};
#[cfg(feature = "toml")]
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub fork: ForkConfig,
    pub chain_score: ChainScoreConfig,
    pub double_spend: DoubleSpendConfig,
    pub pod: PodConfig,
    pub challenge: ChallengeConfig,
    pub mesh: MeshConfig,
    pub transition: TransitionConfig,
    pub mining: MiningConfig,
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForkConfig {
    pub min_quorum_votes: u32,
    pub max_time_difference_secs: f64,
    /// Block-to-block difficulty ratio above which (or below whose inverse)
    /// a chain is flagged
    pub unusual_difficulty_ratio: f64,
    pub min_blocks_for_difficulty_check: usize,
}

impl Default for ForkConfig {
    fn default() -> Self {
        Self {
            min_quorum_votes: 3,
            max_time_difference_secs: 3600.0,
            unusual_difficulty_ratio: 2.0,
            min_blocks_for_difficulty_check: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainScoreConfig {
    pub max_acceptable_latency_secs: f64,
    pub min_mesh_validators: usize,
    pub latency_penalty_factor: f64,
    pub mesh_weight: f64,
    pub quorum_weight: f64,
    pub min_quorum_votes: usize,
    pub min_total_score: f64,
    pub max_latency_penalty: f64,
    pub min_mesh_score: f64,
    pub min_quorum_score: f64,
}

impl Default for ChainScoreConfig {
    fn default() -> Self {
        Self {
            max_acceptable_latency_secs: 3600.0,
            min_mesh_validators: 2,
            latency_penalty_factor: 0.1,
            mesh_weight: 0.4,
            quorum_weight: 0.6,
            min_quorum_votes: 3,
            min_total_score: 0.6,
            max_latency_penalty: 0.3,
            min_mesh_score: 0.5,
            min_quorum_score: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoubleSpendConfig {
    pub spend_lock_secs: f64,
    pub blacklist_threshold: usize,
    pub blacklist_window_secs: f64,
    /// How long audit entries are kept before maintenance drops them
    pub audit_retention_secs: f64,
}

impl Default for DoubleSpendConfig {
    fn default() -> Self {
        Self {
            spend_lock_secs: 3600.0,
            blacklist_threshold: 3,
            blacklist_window_secs: 86_400.0,
            audit_retention_secs: 7.0 * 86_400.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodConfig {
    pub max_pod_age_secs: f64,
    /// Bloom filter size in bits (~1M PODs at 0.01% false positives)
    pub bloom_bits: usize,
    pub bloom_hashes: u32,
}

impl Default for PodConfig {
    fn default() -> Self {
        Self {
            max_pod_age_secs: 86_400.0,
            bloom_bits: 10_000_000,
            bloom_hashes: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
    pub challenge_timeout_secs: f64,
    pub verification_cache_secs: f64,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            challenge_timeout_secs: 30.0,
            verification_cache_secs: 3600.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Validators a mesh block needs
    pub required_validators: usize,
    /// Validators a mesh proof needs
    pub proof_required_validators: usize,
    pub max_hop_distance: u32,
    pub pow_difficulty: u32,
    /// Width of the timestamp salt window for mesh PoW
    pub pow_window_secs: u64,
    pub pow_timeout_secs: u64,
    pub proof_max_age_secs: f64,
    pub node_timeout_secs: f64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            required_validators: 3,
            proof_required_validators: 2,
            max_hop_distance: 3,
            pow_difficulty: 2,
            pow_window_secs: 300,
            pow_timeout_secs: 30,
            proof_max_age_secs: 3600.0,
            node_timeout_secs: 3600.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    pub min_confirmations: u64,
    pub max_offline_secs: f64,
    pub min_signatures: usize,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            min_confirmations: 6,
            max_offline_secs: 86_400.0,
            min_signatures: 1,
        }
    }
}

/// Mining parameters for one connectivity mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningProfile {
    pub difficulty: u32,
    pub max_transactions: usize,
    /// Maximum serialized block size in bytes
    pub block_size: usize,
    pub timeout_secs: u64,
    /// Power budget; sizes the worker pool
    pub max_power: u32,
    pub target_block_secs: f64,
    /// Average block times within `target ± tolerance` leave difficulty alone
    pub target_tolerance_secs: f64,
}

impl MiningProfile {
    /// Throughput-oriented profile for connected nodes.
    pub fn online() -> Self {
        Self {
            difficulty: 4,
            max_transactions: 1000,
            block_size: 1_048_576,
            timeout_secs: 60,
            max_power: 100,
            target_block_secs: 60.0,
            target_tolerance_secs: 10.0,
        }
    }

    /// Low-power profile sized for the radio link.
    pub fn offline() -> Self {
        Self {
            difficulty: 2,
            max_transactions: 10,
            block_size: 1024,
            timeout_secs: 300,
            max_power: 20,
            target_block_secs: 300.0,
            target_tolerance_secs: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    pub online: MiningProfile,
    pub offline: MiningProfile,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            online: MiningProfile::online(),
            offline: MiningProfile::offline(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub pending_cleanup_interval_secs: u64,
    pub challenge_cleanup_interval_secs: u64,
    pub node_timeout_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            pending_cleanup_interval_secs: 60,
            challenge_cleanup_interval_secs: 15,
            node_timeout_interval_secs: 300,
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> CoreError {
    CoreError::InvalidConfig {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn check_unit(field: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(field, format!("{} not in [0, 1]", value)));
    }
    Ok(())
}

fn check_positive(field: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid(field, format!("{} must be positive", value)));
    }
    Ok(())
}

impl ConsensusConfig {
    #[cfg(feature = "toml")]
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject parameter combinations the engine cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.fork.min_quorum_votes == 0 {
            return Err(invalid("fork.min_quorum_votes", "must be at least 1"));
        }
        check_positive("fork.max_time_difference_secs", self.fork.max_time_difference_secs)?;
        if self.fork.unusual_difficulty_ratio <= 1.0 {
            return Err(invalid("fork.unusual_difficulty_ratio", "must exceed 1.0"));
        }

        let score = &self.chain_score;
        check_unit("chain_score.mesh_weight", score.mesh_weight)?;
        check_unit("chain_score.quorum_weight", score.quorum_weight)?;
        check_unit("chain_score.min_total_score", score.min_total_score)?;
        check_unit("chain_score.max_latency_penalty", score.max_latency_penalty)?;
        check_unit("chain_score.min_mesh_score", score.min_mesh_score)?;
        check_unit("chain_score.min_quorum_score", score.min_quorum_score)?;
        if score.min_mesh_validators == 0 || score.min_quorum_votes == 0 {
            return Err(invalid("chain_score", "validator and vote minimums must be at least 1"));
        }
        check_positive("chain_score.max_acceptable_latency_secs", score.max_acceptable_latency_secs)?;

        check_positive("double_spend.spend_lock_secs", self.double_spend.spend_lock_secs)?;
        check_positive("double_spend.blacklist_window_secs", self.double_spend.blacklist_window_secs)?;
        check_positive("double_spend.audit_retention_secs", self.double_spend.audit_retention_secs)?;
        if self.double_spend.audit_retention_secs < self.double_spend.blacklist_window_secs {
            return Err(invalid(
                "double_spend.audit_retention_secs",
                "must cover the blacklist window",
            ));
        }
        if self.double_spend.blacklist_threshold == 0 {
            return Err(invalid("double_spend.blacklist_threshold", "must be at least 1"));
        }

        check_positive("pod.max_pod_age_secs", self.pod.max_pod_age_secs)?;
        if self.pod.bloom_bits == 0 || self.pod.bloom_hashes == 0 {
            return Err(invalid("pod", "bloom_bits and bloom_hashes must be non-zero"));
        }

        check_positive("challenge.challenge_timeout_secs", self.challenge.challenge_timeout_secs)?;
        check_positive("challenge.verification_cache_secs", self.challenge.verification_cache_secs)?;

        if self.mesh.pow_window_secs == 0 {
            return Err(invalid("mesh.pow_window_secs", "must be non-zero"));
        }
        if self.mesh.pow_difficulty > MAX_DIFFICULTY {
            return Err(invalid("mesh.pow_difficulty", "cannot exceed 64 hex digits"));
        }

        check_positive("transition.max_offline_secs", self.transition.max_offline_secs)?;

        for (name, profile) in [("mining.online", &self.mining.online), ("mining.offline", &self.mining.offline)] {
            if profile.max_transactions == 0 || profile.block_size == 0 || profile.max_power == 0 {
                return Err(invalid(name, "caps and power budget must be non-zero"));
            }
            if profile.difficulty == 0 || profile.difficulty > MAX_DIFFICULTY {
                return Err(invalid(name, "difficulty must be in 1..=64"));
            }
        }

        let m = &self.maintenance;
        if m.pending_cleanup_interval_secs == 0
            || m.challenge_cleanup_interval_secs == 0
            || m.node_timeout_interval_secs == 0
        {
            return Err(invalid("maintenance", "intervals must be non-zero"));
        }

        Ok(())
    }
}
