//! Periodic maintenance for the consensus engine.
//!
//! Three independent timers purge expired state:
//! - pending spend locks past the lock window
//! - timed-out challenges and stale verifications
//! - mesh nodes unseen for the node timeout
//!
//! Passes only remove expired entries and hold each component lock for a
//! single call, so they interleave safely with request handling.

use crate::engine::ConsensusEngine;
use logichain_core::config::MaintenanceConfig;
use logichain_core::time::unix_now;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// What one maintenance pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceStats {
    pub pending_purged: usize,
    pub challenges_purged: usize,
    pub verifications_purged: usize,
    pub nodes_pruned: usize,
}

/// Run every maintenance task once at `now`.
pub fn run_all_at(engine: &ConsensusEngine, now: f64) -> MaintenanceStats {
    let mut stats = MaintenanceStats::default();
    match engine.cleanup_old_pending_at(now) {
        Ok(n) => stats.pending_purged = n,
        Err(e) => error!(error = %e, "Pending spend cleanup failed"),
    }
    match engine.cleanup_challenges_at(now) {
        Ok(s) => {
            stats.challenges_purged = s.expired_challenges;
            stats.verifications_purged = s.expired_verifications;
        }
        Err(e) => error!(error = %e, "Challenge cleanup failed"),
    }
    match engine.prune_stale_nodes_at(now) {
        Ok(n) => stats.nodes_pruned = n,
        Err(e) => error!(error = %e, "Mesh node pruning failed"),
    }
    stats
}

fn interval(secs: u64) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Handle to the background maintenance task.
#[derive(Debug)]
pub struct MaintenanceScheduler {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl MaintenanceScheduler {
    /// Spawn the maintenance loop on the current tokio runtime.
    ///
    /// The loop stops when `shutdown` (or a parent token) is cancelled.
    pub fn spawn(
        engine: Arc<ConsensusEngine>,
        config: MaintenanceConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut pending = interval(config.pending_cleanup_interval_secs);
            let mut challenges = interval(config.challenge_cleanup_interval_secs);
            let mut nodes = interval(config.node_timeout_interval_secs);

            info!(
                pending_secs = config.pending_cleanup_interval_secs,
                challenge_secs = config.challenge_cleanup_interval_secs,
                node_secs = config.node_timeout_interval_secs,
                "Maintenance started"
            );

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Maintenance stopped");
                        break;
                    }
                    _ = pending.tick() => {
                        match engine.cleanup_old_pending_at(unix_now()) {
                            Ok(purged) => debug!(purged, "Pending spend cleanup"),
                            Err(e) => error!(error = %e, "Pending spend cleanup failed"),
                        }
                    }
                    _ = challenges.tick() => {
                        match engine.cleanup_challenges_at(unix_now()) {
                            Ok(stats) => debug!(
                                challenges = stats.expired_challenges,
                                verifications = stats.expired_verifications,
                                "Challenge cleanup"
                            ),
                            Err(e) => error!(error = %e, "Challenge cleanup failed"),
                        }
                    }
                    _ = nodes.tick() => {
                        match engine.prune_stale_nodes_at(unix_now()) {
                            Ok(pruned) => debug!(pruned, "Mesh node pruning"),
                            Err(e) => error!(error = %e, "Mesh node pruning failed"),
                        }
                    }
                }
            }
        });

        Self { shutdown, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            error!(error = %e, "Maintenance task panicked");
        }
    }
}
