//! Known mesh nodes and their reputation.
//!
//! Reputation moves asymmetrically: a successful validation adds 0.1
//! (capped at 1.0) and a failure removes 0.2 (floored at 0.0), so a node
//! needs two good validations to recover from one bad one.

use crate::error::{MeshError, MeshResult};
use logichain_core::time::{unix_now, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Reputation gained per successful validation.
pub const REPUTATION_REWARD: f64 = 0.1;

/// Reputation lost per failed validation.
pub const REPUTATION_PENALTY: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshNode {
    pub node_id: String,
    /// Hex-encoded public key
    pub public_key: String,
    pub last_seen: Timestamp,
    /// Always in `[0, 1]`
    pub reputation: f64,
}

#[derive(Debug, Clone)]
pub struct MeshNodeRegistry {
    nodes: HashMap<String, MeshNode>,
    node_timeout_secs: f64,
}

impl MeshNodeRegistry {
    pub fn new(node_timeout_secs: f64) -> Self {
        Self {
            nodes: HashMap::new(),
            node_timeout_secs,
        }
    }

    /// Add or replace a node.
    pub fn add_node(&mut self, mut node: MeshNode) {
        node.reputation = node.reputation.clamp(0.0, 1.0);
        debug!(node_id = %node.node_id, reputation = node.reputation, "Mesh node registered");
        self.nodes.insert(node.node_id.clone(), node);
    }

    pub fn node(&self, node_id: &str) -> Option<&MeshNode> {
        self.nodes.get(node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn update_node_reputation(&mut self, node_id: &str, success: bool) -> MeshResult<f64> {
        self.update_node_reputation_at(node_id, success, unix_now())
    }

    /// Apply a validation outcome and refresh `last_seen`.
    ///
    /// # Returns
    /// The node's new reputation.
    pub fn update_node_reputation_at(
        &mut self,
        node_id: &str,
        success: bool,
        now: Timestamp,
    ) -> MeshResult<f64> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| MeshError::UnknownNode(node_id.to_string()))?;

        node.reputation = if success {
            (node.reputation + REPUTATION_REWARD).min(1.0)
        } else {
            (node.reputation - REPUTATION_PENALTY).max(0.0)
        };
        node.last_seen = now;

        debug!(node_id = %node_id, success, reputation = node.reputation, "Reputation updated");
        Ok(node.reputation)
    }

    pub fn prune_stale_nodes(&mut self) -> usize {
        self.prune_stale_nodes_at(unix_now())
    }

    /// Drop nodes unseen for longer than the node timeout.
    pub fn prune_stale_nodes_at(&mut self, now: Timestamp) -> usize {
        let timeout = self.node_timeout_secs;
        let before = self.nodes.len();
        self.nodes.retain(|_, node| now - node.last_seen <= timeout);
        let pruned = before - self.nodes.len();
        if pruned > 0 {
            info!(pruned, remaining = self.nodes.len(), "Pruned stale mesh nodes");
        }
        pruned
    }
}
