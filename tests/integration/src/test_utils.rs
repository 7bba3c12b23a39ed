//! Shared fixtures for scenario tests

use logichain_consensus::ConsensusEngine;
use logichain_core::config::ConsensusConfig;
use logichain_core::types::{Block, ChainInfo, ConnectivityMode};
use logichain_crypto::NodeKeys;
use logichain_guard::NodeSignature;
use std::collections::HashMap;
use std::sync::{Arc, Once};

/// Fixed scenario start time (Unix seconds)
pub const T0: f64 = 1_700_000_000.0;

/// Block hash every test engine treats as deeply confirmed
pub const CONFIRMED_BLOCK: &str = "online-anchor";

static LOGGING: Once = Once::new();

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Engine with default rules and a small Bloom filter.
pub fn test_engine() -> Arc<ConsensusEngine> {
    test_engine_with(ConsensusConfig::default())
}

pub fn test_engine_with(mut config: ConsensusConfig) -> Arc<ConsensusEngine> {
    init_test_logging();
    config.pod.bloom_bits = 1 << 16;
    let confirmations: HashMap<String, u64> = [(CONFIRMED_BLOCK.to_string(), 12u64)].into();
    Arc::new(
        ConsensusEngine::new("node-local", Arc::new(config), Arc::new(confirmations))
            .expect("default rules are valid"),
    )
}

/// A registered transition validator.
pub struct TestValidator {
    pub node_id: String,
    pub keys: NodeKeys,
}

impl TestValidator {
    pub fn register(engine: &ConsensusEngine, node_id: &str) -> Self {
        let keys = NodeKeys::generate();
        engine
            .register_validator(node_id, keys.verifying_key())
            .expect("engine lock");
        Self {
            node_id: node_id.to_string(),
            keys,
        }
    }

    pub fn sign(&self, message: &[u8]) -> NodeSignature {
        NodeSignature {
            node_id: self.node_id.clone(),
            signature: self.keys.sign(message),
        }
    }
}

/// Linked chain of `difficulties.len()` blocks, one minute apart.
pub fn build_chain(
    difficulties: &[u64],
    start: f64,
    quorum_votes: u32,
    mode: ConnectivityMode,
) -> Arc<ChainInfo> {
    let mut blocks = Vec::with_capacity(difficulties.len());
    let mut previous = "genesis".to_string();
    for (height, difficulty) in difficulties.iter().enumerate() {
        let hash = format!("{}-{}", mode.as_str(), height);
        blocks.push(Block {
            hash: hash.clone(),
            previous_hash: previous,
            timestamp: start + height as f64 * 60.0,
            difficulty: *difficulty,
            mesh_validators: vec!["mesh-a".to_string(), "mesh-b".to_string()],
            quorum_votes: vec!["q1".to_string(), "q2".to_string(), "q3".to_string()],
        });
        previous = hash;
    }
    Arc::new(ChainInfo::new(blocks, quorum_votes, mode))
}
