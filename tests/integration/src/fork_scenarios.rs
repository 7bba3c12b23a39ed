//! Fork resolution scenarios

use crate::test_utils::*;
use logichain_consensus::{ChainSide, ForkReason};
use logichain_core::types::ConnectivityMode;

#[test]
fn test_equal_chains_online_quorum_wins() {
    let engine = test_engine();
    let online = build_chain(&[4; 10], T0, 5, ConnectivityMode::Online);
    let offline = build_chain(&[4; 10], T0, 1, ConnectivityMode::Offline);
    assert_eq!(online.total_difficulty, 40);
    assert_eq!(offline.total_difficulty, 40);

    let resolution = engine.resolve_fork_at(&online, &offline, T0 + 600.0);
    assert_eq!(resolution.winner, ChainSide::Online);
    assert_eq!(resolution.reason.to_string(), "Online quorum validation");
    assert!(!resolution.suspicious);
    assert!(engine.audit_report().unwrap().suspicious_forks.is_empty());
}

#[test]
fn test_resolution_is_repeatable() {
    let engine = test_engine();
    let online = build_chain(&[2, 2, 8, 8], T0, 0, ConnectivityMode::Online);
    let offline = build_chain(&[5, 5, 5, 5], T0 + 5000.0, 0, ConnectivityMode::Offline);

    let first = engine.resolve_fork_at(&online, &offline, T0);
    let second = engine.resolve_fork_at(&online, &offline, T0 + 10_000.0);
    assert_eq!(first.winner, second.winner);
    assert_eq!(first.suspicious, second.suspicious);
    assert_eq!(first.reason, ForkReason::DefaultOnline);
    assert!(first.suspicious);
    assert_eq!(engine.audit_report().unwrap().suspicious_forks.len(), 2);
}

#[test]
fn test_longer_offline_chain_wins_and_scores() {
    let engine = test_engine();
    let online = build_chain(&[4; 3], T0, 5, ConnectivityMode::Online);
    let offline = build_chain(&[2; 6], T0, 0, ConnectivityMode::Offline);

    let resolution = engine.resolve_fork_at(&online, &offline, T0);
    assert_eq!(resolution.winner, ChainSide::Offline);

    let score = engine.calculate_chain_score(&offline, T0 + 300.0).unwrap();
    assert_eq!(score.mesh_score, 1.0);
    assert_eq!(score.quorum_score, 1.0);
    assert!(engine.is_chain_suspicious(&score));
}
