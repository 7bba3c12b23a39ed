//! Fork resolution between an online chain and an offline (mesh) chain.
//!
//! Decision order:
//! 1. Longer chain wins
//! 2. Higher cumulative difficulty wins
//! 3. Online wins when it carries quorum
//! 4. Otherwise online wins by default, flagged suspicious when the pair
//!    shows a large tip time gap, an unusual difficulty jump, or missing
//!    online quorum
//!
//! Suspicious pairs are queued for operator audit. Resolution never fails:
//! structurally broken input resolves to the online chain, flagged.

use logichain_core::config::ForkConfig;
use logichain_core::time::{unix_now, Timestamp};
use logichain_core::types::{Block, ChainInfo, ConnectivityMode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainSide {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForkReason {
    HeightDifference,
    DifficultyDifference,
    OnlineQuorum,
    DefaultOnline,
    /// Input could not be evaluated
    Error(String),
}

impl fmt::Display for ForkReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForkReason::HeightDifference => write!(f, "Height difference"),
            ForkReason::DifficultyDifference => write!(f, "Difficulty difference"),
            ForkReason::OnlineQuorum => write!(f, "Online quorum validation"),
            ForkReason::DefaultOnline => write!(f, "Default to online chain"),
            ForkReason::Error(e) => write!(f, "Error in resolution: {}", e),
        }
    }
}

/// Per-chain figures reported alongside a resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainMetrics {
    pub length: usize,
    pub difficulty: u64,
    pub quorum_votes: u32,
    /// Mean gap between consecutive blocks, `0.0` under two blocks
    pub avg_block_time: f64,
    pub time_since_last: f64,
    pub mode: ConnectivityMode,
}

impl ChainMetrics {
    fn of(chain: &ChainInfo, now: Timestamp) -> Self {
        Self {
            length: chain.blocks.len(),
            difficulty: chain.total_difficulty,
            quorum_votes: chain.quorum_votes,
            avg_block_time: avg_block_time(&chain.blocks),
            time_since_last: now - chain.last_block_time,
            mode: chain.mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForkMetrics {
    pub online: ChainMetrics,
    pub offline: ChainMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForkResolution {
    pub winner: ChainSide,
    pub reason: ForkReason,
    pub suspicious: bool,
    /// `None` when the input could not be evaluated
    pub metrics: Option<ForkMetrics>,
}

/// A suspicious chain pair awaiting operator review.
#[derive(Debug, Clone, PartialEq)]
pub struct SuspiciousFork {
    pub online: Arc<ChainInfo>,
    pub offline: Arc<ChainInfo>,
    pub reason: ForkReason,
    pub detected_at: Timestamp,
}

#[derive(Debug)]
pub struct ForkResolver {
    config: ForkConfig,
    audit_queue: Vec<SuspiciousFork>,
}

impl ForkResolver {
    pub fn new(config: ForkConfig) -> Self {
        Self {
            config,
            audit_queue: Vec::new(),
        }
    }

    pub fn resolve_fork(&mut self, online: &Arc<ChainInfo>, offline: &Arc<ChainInfo>) -> ForkResolution {
        self.resolve_fork_at(online, offline, unix_now())
    }

    /// Pick the canonical chain.
    ///
    /// `now` only feeds the reported metrics; the winner and the suspicion
    /// flag depend on the two chains alone.
    pub fn resolve_fork_at(
        &mut self,
        online: &Arc<ChainInfo>,
        offline: &Arc<ChainInfo>,
        now: Timestamp,
    ) -> ForkResolution {
        let resolution = self.evaluate(online, offline, now);

        if resolution.suspicious {
            warn!(
                reason = %resolution.reason,
                online_height = online.height(),
                offline_height = offline.height(),
                "Suspicious fork queued for audit"
            );
            self.audit_queue.push(SuspiciousFork {
                online: Arc::clone(online),
                offline: Arc::clone(offline),
                reason: resolution.reason.clone(),
                detected_at: now,
            });
        } else {
            info!(
                winner = ?resolution.winner,
                reason = %resolution.reason,
                "Fork resolved"
            );
        }

        resolution
    }

    /// Pure decision over the two chains.
    pub fn evaluate(&self, online: &ChainInfo, offline: &ChainInfo, now: Timestamp) -> ForkResolution {
        for chain in [online, offline] {
            if let Err(e) = chain.validate() {
                return ForkResolution {
                    winner: ChainSide::Online,
                    reason: ForkReason::Error(format!("{} chain: {}", chain.mode, e)),
                    suspicious: true,
                    metrics: None,
                };
            }
        }

        let metrics = Some(ForkMetrics {
            online: ChainMetrics::of(online, now),
            offline: ChainMetrics::of(offline, now),
        });
        let decided = |winner, reason| ForkResolution {
            winner,
            reason,
            suspicious: false,
            metrics: metrics.clone(),
        };

        if online.height() != offline.height() {
            let winner = if online.height() > offline.height() {
                ChainSide::Online
            } else {
                ChainSide::Offline
            };
            return decided(winner, ForkReason::HeightDifference);
        }

        if online.total_difficulty != offline.total_difficulty {
            let winner = if online.total_difficulty > offline.total_difficulty {
                ChainSide::Online
            } else {
                ChainSide::Offline
            };
            return decided(winner, ForkReason::DifficultyDifference);
        }

        if online.quorum_votes >= self.config.min_quorum_votes {
            return decided(ChainSide::Online, ForkReason::OnlineQuorum);
        }

        ForkResolution {
            winner: ChainSide::Online,
            reason: ForkReason::DefaultOnline,
            suspicious: self.is_fork_suspicious(online, offline),
            metrics,
        }
    }

    fn is_fork_suspicious(&self, online: &ChainInfo, offline: &ChainInfo) -> bool {
        let gap = (online.last_block_time - offline.last_block_time).abs();
        gap > self.config.max_time_difference_secs
            || self.has_unusual_difficulty(&online.blocks)
            || self.has_unusual_difficulty(&offline.blocks)
            || online.quorum_votes < self.config.min_quorum_votes
    }

    fn has_unusual_difficulty(&self, blocks: &[Block]) -> bool {
        if blocks.len() < self.config.min_blocks_for_difficulty_check {
            return false;
        }
        let high = self.config.unusual_difficulty_ratio;
        let low = 1.0 / high;
        blocks.windows(2).any(|pair| {
            let (prev, next) = (pair[0].difficulty, pair[1].difficulty);
            let ratio = if prev > 0 {
                next as f64 / prev as f64
            } else {
                1.0
            };
            ratio > high || ratio < low
        })
    }

    /// Snapshot of queued suspicious forks, oldest first.
    pub fn audit_queue(&self) -> Vec<SuspiciousFork> {
        self.audit_queue.clone()
    }

    pub fn clear_audit_queue(&mut self) {
        self.audit_queue.clear();
    }
}

impl Default for ForkResolver {
    fn default() -> Self {
        Self::new(ForkConfig::default())
    }
}

fn avg_block_time(blocks: &[Block]) -> f64 {
    if blocks.len() < 2 {
        return 0.0;
    }
    let total: f64 = blocks
        .windows(2)
        .map(|pair| pair[1].timestamp - pair[0].timestamp)
        .sum();
    total / (blocks.len() - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const T0: f64 = 1_700_000_000.0;

    fn chain(difficulties: &[u64], start: f64, votes: u32, mode: ConnectivityMode) -> Arc<ChainInfo> {
        let mut blocks = Vec::new();
        let mut prev = "genesis".to_string();
        for (i, d) in difficulties.iter().enumerate() {
            let hash = format!("{}-{}", mode.as_str(), i);
            blocks.push(Block {
                hash: hash.clone(),
                previous_hash: prev,
                timestamp: start + i as f64 * 60.0,
                difficulty: *d,
                mesh_validators: vec![],
                quorum_votes: vec![],
            });
            prev = hash;
        }
        Arc::new(ChainInfo::new(blocks, votes, mode))
    }

    #[test]
    fn test_longer_chain_wins() {
        let mut resolver = ForkResolver::default();
        let online = chain(&[4; 5], T0, 0, ConnectivityMode::Online);
        let offline = chain(&[2; 7], T0, 0, ConnectivityMode::Offline);
        let res = resolver.resolve_fork_at(&online, &offline, T0);
        assert_eq!(res.winner, ChainSide::Offline);
        assert_eq!(res.reason, ForkReason::HeightDifference);
        assert!(!res.suspicious);
        assert_eq!(res.metrics.unwrap().offline.length, 7);
    }

    #[test]
    fn test_higher_difficulty_wins() {
        let mut resolver = ForkResolver::default();
        let online = chain(&[4, 4, 4], T0, 0, ConnectivityMode::Online);
        let offline = chain(&[4, 4, 5], T0, 0, ConnectivityMode::Offline);
        let res = resolver.resolve_fork_at(&online, &offline, T0);
        assert_eq!(res.winner, ChainSide::Offline);
        assert_eq!(res.reason.to_string(), "Difficulty difference");
    }

    #[test]
    fn test_equal_chains_with_quorum_pick_online() {
        let mut resolver = ForkResolver::default();
        let online = chain(&[4; 10], T0, 5, ConnectivityMode::Online);
        let offline = chain(&[4; 10], T0, 0, ConnectivityMode::Offline);
        assert_eq!(online.total_difficulty, 40);

        let res = resolver.resolve_fork_at(&online, &offline, T0);
        assert_eq!(res.winner, ChainSide::Online);
        assert_eq!(res.reason.to_string(), "Online quorum validation");
        assert!(!res.suspicious);
        assert!(resolver.audit_queue().is_empty());
    }

    #[test]
    fn test_missing_quorum_is_suspicious_and_queued() {
        let mut resolver = ForkResolver::default();
        let online = chain(&[4; 4], T0, 1, ConnectivityMode::Online);
        let offline = chain(&[4; 4], T0, 0, ConnectivityMode::Offline);

        let res = resolver.resolve_fork_at(&online, &offline, T0);
        assert_eq!(res.winner, ChainSide::Online);
        assert_eq!(res.reason, ForkReason::DefaultOnline);
        assert!(res.suspicious);

        let queue = resolver.audit_queue();
        assert_eq!(queue.len(), 1);
        assert!(Arc::ptr_eq(&queue[0].online, &online));

        resolver.clear_audit_queue();
        assert!(resolver.audit_queue().is_empty());
    }

    #[test]
    fn test_unusual_difficulty_detection() {
        let resolver = ForkResolver::default();
        let jumpy = chain(&[2, 2, 5], T0, 0, ConnectivityMode::Online);
        let drop = chain(&[4, 4, 1], T0, 0, ConnectivityMode::Online);
        let short = chain(&[1, 9], T0, 0, ConnectivityMode::Online);
        let steady = chain(&[2, 4, 8], T0, 0, ConnectivityMode::Online);
        assert!(resolver.has_unusual_difficulty(&jumpy.blocks));
        assert!(resolver.has_unusual_difficulty(&drop.blocks));
        assert!(!resolver.has_unusual_difficulty(&short.blocks));
        assert!(!resolver.has_unusual_difficulty(&steady.blocks));
    }

    #[test]
    fn test_time_gap_is_suspicious() {
        let resolver = ForkResolver::new(ForkConfig {
            min_quorum_votes: 0,
            ..ForkConfig::default()
        });
        let online = chain(&[4; 2], T0, 0, ConnectivityMode::Online);
        let near = chain(&[4; 2], T0 + 3600.0, 0, ConnectivityMode::Offline);
        let far = chain(&[4; 2], T0 + 3601.0, 0, ConnectivityMode::Offline);
        assert!(!resolver.is_fork_suspicious(&online, &near));
        assert!(resolver.is_fork_suspicious(&online, &far));
    }

    #[test]
    fn test_broken_chain_defaults_to_online_flagged() {
        let mut resolver = ForkResolver::default();
        let online = chain(&[4; 3], T0, 5, ConnectivityMode::Online);
        let mut broken = (*chain(&[4; 5], T0, 0, ConnectivityMode::Offline)).clone();
        broken.blocks[2].previous_hash = "forged".to_string();
        let broken = Arc::new(broken);

        let res = resolver.resolve_fork_at(&online, &broken, T0);
        assert_eq!(res.winner, ChainSide::Online);
        assert!(res.suspicious);
        assert!(matches!(res.reason, ForkReason::Error(_)));
        assert!(res.metrics.is_none());
        assert_eq!(resolver.audit_queue().len(), 1);
    }

    #[test]
    fn test_avg_block_time() {
        let c = chain(&[1, 1, 1], T0, 0, ConnectivityMode::Online);
        assert_eq!(avg_block_time(&c.blocks), 60.0);
        assert_eq!(avg_block_time(&c.blocks[..1]), 0.0);
    }

    proptest! {
        #[test]
        fn prop_resolution_is_deterministic(
            online_diffs in proptest::collection::vec(1u64..8, 0..8),
            offline_diffs in proptest::collection::vec(1u64..8, 0..8),
            online_votes in 0u32..6,
            gap in 0.0f64..7200.0,
        ) {
            let resolver = ForkResolver::default();
            let online = chain(&online_diffs, T0, online_votes, ConnectivityMode::Online);
            let offline = chain(&offline_diffs, T0 + gap, 0, ConnectivityMode::Offline);

            let first = resolver.evaluate(&online, &offline, T0);
            let second = resolver.evaluate(&online, &offline, T0 + 999.0);
            prop_assert_eq!(first.winner, second.winner);
            prop_assert_eq!(first.suspicious, second.suspicious);
            prop_assert_eq!(first.reason, second.reason);
        }
    }
}
