//! Background maintenance against a shared engine

use crate::test_utils::*;
use logichain_consensus::{run_all_at, MaintenanceScheduler};
use logichain_core::config::MaintenanceConfig;
use logichain_crypto::NodeKeys;
use logichain_guard::OutputRef;
use logichain_trust_mesh::MeshNode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[test]
fn test_single_pass_clears_expired_state() {
    let engine = test_engine();
    let issuer = NodeKeys::generate();

    engine
        .check_spend_attempt_at("tx-a", "alice", &[OutputRef::new("in", 0)], 1.0, 1, T0)
        .unwrap();
    engine.create_challenge_at("peer-1", issuer.signing_key(), T0).unwrap();
    engine
        .register_mesh_node(MeshNode {
            node_id: "relay".to_string(),
            public_key: String::new(),
            last_seen: T0,
            reputation: 0.5,
        })
        .unwrap();

    let stats = run_all_at(&engine, T0 + 2.0 * 3600.0);
    assert_eq!(stats.pending_purged, 1);
    assert_eq!(stats.challenges_purged, 1);
    assert_eq!(stats.nodes_pruned, 1);

    // The lock is gone, so another transaction may take the input.
    assert!(engine
        .check_spend_attempt_at("tx-b", "bob", &[OutputRef::new("in", 0)], 1.0, 1, T0 + 2.0 * 3600.0)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_scheduler_serves_while_engine_in_use() {
    let engine = test_engine();
    let shutdown = CancellationToken::new();
    let scheduler = MaintenanceScheduler::spawn(
        Arc::clone(&engine),
        MaintenanceConfig::default(),
        shutdown.child_token(),
    );

    let worker = {
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || {
            for i in 0..50u32 {
                engine
                    .check_spend_attempt(&format!("tx-{}", i), "alice", &[OutputRef::new("in", i)], 1.0, u64::from(i))
                    .unwrap();
            }
        })
    };
    worker.await.unwrap();

    assert!(scheduler.is_running());
    shutdown.cancel();
    scheduler.shutdown().await;
    let status = engine.wallet_status("alice").unwrap();
    assert!(!status.is_blacklisted);
    assert_eq!(status.malicious_attempts, 0);
}
