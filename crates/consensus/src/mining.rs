//! Dual-mode mining.
//!
//! Online mining favors throughput; offline mining runs at low difficulty
//! with tiny blocks that fit the radio link. Both search nonces with a
//! worker pool sized by the mode's power budget and give up at the mode's
//! timeout.

use crate::error::MiningError;
use logichain_core::config::{MiningConfig, MiningProfile};
use logichain_core::hashing::{canonical_json_of, sha256_hex};
use logichain_core::pow::{meets_difficulty, search_nonce, PowOutcome, SearchParams, MAX_DIFFICULTY};
use logichain_core::time::{unix_now, Timestamp};
use logichain_core::types::ConnectivityMode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Power units one search worker consumes.
pub const POWER_PER_WORKER: u32 = 20;

/// Block contents hashed by the miner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinedBlock {
    pub node_id: String,
    pub previous_hash: String,
    pub timestamp: Timestamp,
    pub transactions: Vec<Value>,
    pub mode: ConnectivityMode,
    pub nonce: u64,
}

impl MinedBlock {
    /// Canonical serialization: sorted keys, legacy separators.
    pub fn serialize(&self) -> logichain_core::Result<String> {
        canonical_json_of(self)
    }

    pub fn block_hash(&self) -> logichain_core::Result<String> {
        Ok(sha256_hex(self.serialize()?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningResult {
    pub success: bool,
    pub block: Option<MinedBlock>,
    pub block_hash: Option<String>,
    pub timestamp: Timestamp,
    pub power_used: u32,
    pub mode: ConnectivityMode,
    pub attempts: u64,
}

#[derive(Debug, Clone)]
pub struct DualMiningController {
    node_id: String,
    online: MiningProfile,
    offline: MiningProfile,
}

impl DualMiningController {
    pub fn new(node_id: impl Into<String>, config: MiningConfig) -> Self {
        Self {
            node_id: node_id.into(),
            online: config.online,
            offline: config.offline,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Current profile for `mode`, including difficulty adjustments.
    pub fn config(&self, mode: ConnectivityMode) -> &MiningProfile {
        match mode {
            ConnectivityMode::Online => &self.online,
            ConnectivityMode::Offline => &self.offline,
        }
    }

    fn config_mut(&mut self, mode: ConnectivityMode) -> &mut MiningProfile {
        match mode {
            ConnectivityMode::Online => &mut self.online,
            ConnectivityMode::Offline => &mut self.offline,
        }
    }

    fn workers(profile: &MiningProfile) -> usize {
        let budget = (profile.max_power / POWER_PER_WORKER).max(1) as usize;
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        budget.min(cores)
    }

    pub fn mine_block(
        &self,
        transactions: Vec<Value>,
        mode: ConnectivityMode,
        previous_hash: &str,
        cancel: &CancellationToken,
    ) -> Result<MiningResult, MiningError> {
        self.mine_block_at(transactions, mode, previous_hash, cancel, unix_now())
    }

    /// Mine a block stamped `now`.
    ///
    /// Transactions beyond the mode's cap are dropped. Timeout and
    /// cancellation yield an unsuccessful result, not an error.
    pub fn mine_block_at(
        &self,
        mut transactions: Vec<Value>,
        mode: ConnectivityMode,
        previous_hash: &str,
        cancel: &CancellationToken,
        now: Timestamp,
    ) -> Result<MiningResult, MiningError> {
        let profile = self.config(mode);
        transactions.truncate(profile.max_transactions);

        let template = MinedBlock {
            node_id: self.node_id.clone(),
            previous_hash: previous_hash.to_string(),
            timestamp: now,
            transactions,
            mode,
            nonce: 0,
        };

        let params = SearchParams {
            difficulty: profile.difficulty,
            workers: Self::workers(profile),
            timeout: Duration::from_secs(profile.timeout_secs),
            start_nonce: 0,
        };
        let outcome = search_nonce(&params, cancel, |nonce| {
            let candidate = MinedBlock {
                nonce,
                ..template.clone()
            };
            candidate.block_hash()
        })?;

        let attempts = outcome.attempts();
        let failed = |attempts| MiningResult {
            success: false,
            block: None,
            block_hash: None,
            timestamp: unix_now(),
            power_used: profile.max_power,
            mode,
            attempts,
        };

        match outcome {
            PowOutcome::Found { nonce, hash, .. } => {
                info!(
                    mode = %mode,
                    nonce,
                    attempts,
                    transactions = template.transactions.len(),
                    hash = %hash,
                    "Block mined"
                );
                Ok(MiningResult {
                    success: true,
                    block: Some(MinedBlock { nonce, ..template }),
                    block_hash: Some(hash),
                    timestamp: unix_now(),
                    power_used: profile.max_power,
                    mode,
                    attempts,
                })
            }
            PowOutcome::TimedOut { .. } => {
                warn!(mode = %mode, attempts, timeout_secs = profile.timeout_secs, "Mining timed out");
                Ok(failed(attempts))
            }
            PowOutcome::Cancelled { .. } => {
                debug!(mode = %mode, attempts, "Mining cancelled");
                Ok(failed(attempts))
            }
        }
    }

    /// Check size, transaction count and difficulty against `mode`'s profile.
    pub fn validate_block(&self, block: &MinedBlock, mode: ConnectivityMode) -> Result<(), MiningError> {
        let profile = self.config(mode);

        let serialized = block.serialize()?;
        if serialized.len() > profile.block_size {
            return Err(MiningError::BlockTooLarge {
                size: serialized.len(),
                max: profile.block_size,
            });
        }
        if block.transactions.len() > profile.max_transactions {
            return Err(MiningError::TooManyTransactions {
                count: block.transactions.len(),
                max: profile.max_transactions,
            });
        }
        if !meets_difficulty(&sha256_hex(&serialized), profile.difficulty) {
            return Err(MiningError::InsufficientDifficulty {
                difficulty: profile.difficulty,
            });
        }
        Ok(())
    }

    /// Nudge difficulty toward the mode's target block time.
    ///
    /// # Returns
    /// The new difficulty, kept within `1..=MAX_DIFFICULTY`.
    pub fn adjust_difficulty(&mut self, mode: ConnectivityMode, avg_block_secs: f64) -> u32 {
        let profile = self.config_mut(mode);
        let before = profile.difficulty;
        let fast = profile.target_block_secs - profile.target_tolerance_secs;
        let slow = profile.target_block_secs + profile.target_tolerance_secs;

        if avg_block_secs < fast {
            profile.difficulty = profile.difficulty.saturating_add(1).min(MAX_DIFFICULTY);
        } else if avg_block_secs > slow {
            profile.difficulty = profile.difficulty.saturating_sub(1).max(1);
        }

        if profile.difficulty != before {
            info!(
                mode = %mode,
                avg_block_secs,
                from = before,
                to = profile.difficulty,
                "Mining difficulty adjusted"
            );
        }
        profile.difficulty
    }

    /// Rough power draw for mining `transaction_count` transactions.
    pub fn estimate_power_usage(&self, transaction_count: usize, mode: ConnectivityMode) -> u32 {
        let (base, per_tx) = match mode {
            ConnectivityMode::Online => (5.0, 0.1),
            ConnectivityMode::Offline => (1.0, 0.01),
        };
        let estimate = (base + transaction_count as f64 * per_tx) as u32;
        estimate.min(self.config(mode).max_power)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const T0: f64 = 1_700_000_000.0;

    fn controller() -> DualMiningController {
        let mut config = MiningConfig::default();
        config.online.difficulty = 2;
        config.online.timeout_secs = 30;
        config.offline.difficulty = 1;
        DualMiningController::new("node-1", config)
    }

    fn txs(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({"id": i, "amount": 1.5})).collect()
    }

    #[test]
    fn test_mine_and_validate_offline() {
        let miner = controller();
        let result = miner
            .mine_block_at(txs(25), ConnectivityMode::Offline, "prev", &CancellationToken::new(), T0)
            .unwrap();
        assert!(result.success);
        let block = result.block.unwrap();
        assert_eq!(block.transactions.len(), 10);
        assert_eq!(result.block_hash.unwrap(), block.block_hash().unwrap());
        assert!(miner.validate_block(&block, ConnectivityMode::Offline).is_ok());
    }

    #[test]
    fn test_mine_online() {
        let miner = controller();
        let result = miner
            .mine_block_at(txs(3), ConnectivityMode::Online, "prev", &CancellationToken::new(), T0)
            .unwrap();
        assert!(result.success);
        assert!(result.block_hash.unwrap().starts_with("00"));
        assert_eq!(result.power_used, 100);
    }

    #[test]
    fn test_cancelled_search_fails_cleanly() {
        let mut config = MiningConfig::default();
        config.online.difficulty = 64;
        let miner = DualMiningController::new("node-1", config);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = miner
            .mine_block_at(txs(1), ConnectivityMode::Online, "prev", &cancel, T0)
            .unwrap();
        assert!(!result.success);
        assert!(result.block.is_none());
    }

    #[test]
    fn test_timeout_fails_cleanly() {
        let mut config = MiningConfig::default();
        config.offline.difficulty = 64;
        config.offline.timeout_secs = 0;
        let miner = DualMiningController::new("node-1", config);

        let result = miner
            .mine_block_at(txs(1), ConnectivityMode::Offline, "prev", &CancellationToken::new(), T0)
            .unwrap();
        assert!(!result.success);
    }

    #[test]
    fn test_validate_rejections() {
        let miner = controller();
        let mined = miner
            .mine_block_at(txs(2), ConnectivityMode::Offline, "prev", &CancellationToken::new(), T0)
            .unwrap()
            .block
            .unwrap();

        let mut crowded = mined.clone();
        crowded.transactions = txs(11);
        assert!(matches!(
            miner.validate_block(&crowded, ConnectivityMode::Offline),
            Err(MiningError::TooManyTransactions { count: 11, max: 10 })
        ));

        let mut bulky = mined.clone();
        bulky.transactions = vec![json!({"blob": "x".repeat(2048)})];
        assert!(matches!(
            miner.validate_block(&bulky, ConnectivityMode::Offline),
            Err(MiningError::BlockTooLarge { .. })
        ));

        // Difficulty 6 online is out of reach of a difficulty-1 nonce.
        let mut strict = miner.clone();
        strict.online.difficulty = 6;
        assert!(matches!(
            strict.validate_block(&mined, ConnectivityMode::Online),
            Err(MiningError::InsufficientDifficulty { difficulty: 6 })
        ));
    }

    #[test]
    fn test_adjust_difficulty() {
        let mut miner = DualMiningController::new("n", MiningConfig::default());
        assert_eq!(miner.adjust_difficulty(ConnectivityMode::Online, 40.0), 5);
        assert_eq!(miner.adjust_difficulty(ConnectivityMode::Online, 60.0), 5);
        assert_eq!(miner.adjust_difficulty(ConnectivityMode::Online, 80.0), 4);

        assert_eq!(miner.adjust_difficulty(ConnectivityMode::Offline, 200.0), 3);
        assert_eq!(miner.adjust_difficulty(ConnectivityMode::Offline, 300.0), 3);
        for _ in 0..5 {
            miner.adjust_difficulty(ConnectivityMode::Offline, 400.0);
        }
        assert_eq!(miner.config(ConnectivityMode::Offline).difficulty, 1);
    }

    #[test]
    fn test_adjust_difficulty_stops_at_digest_width() {
        let mut miner = DualMiningController::new("n", MiningConfig::default());
        for _ in 0..100 {
            miner.adjust_difficulty(ConnectivityMode::Online, 1.0);
        }
        assert_eq!(miner.config(ConnectivityMode::Online).difficulty, MAX_DIFFICULTY);
        assert_eq!(miner.adjust_difficulty(ConnectivityMode::Online, 1.0), MAX_DIFFICULTY);
    }

    #[test]
    fn test_estimate_power_usage() {
        let miner = DualMiningController::new("n", MiningConfig::default());
        assert_eq!(miner.estimate_power_usage(0, ConnectivityMode::Online), 5);
        assert_eq!(miner.estimate_power_usage(100, ConnectivityMode::Online), 15);
        assert_eq!(miner.estimate_power_usage(10_000, ConnectivityMode::Online), 100);
        assert_eq!(miner.estimate_power_usage(100, ConnectivityMode::Offline), 2);
        assert_eq!(miner.estimate_power_usage(100_000, ConnectivityMode::Offline), 20);
    }

    #[test]
    fn test_worker_pool_follows_power_budget() {
        let offline = MiningProfile::offline();
        assert_eq!(DualMiningController::workers(&offline), 1);
        let online = MiningProfile::online();
        assert!(DualMiningController::workers(&online) <= 5);
    }
}
