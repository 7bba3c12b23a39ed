//! Offline excursion: anchor, mesh activity, reconnection

use crate::test_utils::*;
use logichain_consensus::EngineError;
use logichain_core::types::ConnectivityMode;
use logichain_guard::{
    offline_message, online_message, OfflineOperation, TransitionError, TransitionKind,
    TransitionState,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn operation(id: &str, at: f64) -> OfflineOperation {
    OfflineOperation {
        id: id.to_string(),
        kind: "delivery".to_string(),
        timestamp: at,
        payload: json!({"contract": id}),
    }
}

#[test]
fn test_full_offline_round_trip() {
    let engine = test_engine();
    let validator = TestValidator::register(&engine, "validator-1");

    let offline = engine
        .transition_to_offline_at(
            CONFIRMED_BLOCK,
            &[validator.sign(&offline_message(CONFIRMED_BLOCK))],
            T0,
        )
        .unwrap();
    assert_eq!(offline.kind, TransitionKind::OfflineTransition);
    assert_eq!(engine.transition_state().unwrap(), TransitionState::Offline);

    // Mesh peers attest a batch while disconnected.
    let cancel = CancellationToken::new();
    let mesh_block = engine
        .create_mesh_block_at(
            vec![json!({"tx": "t1"}), json!({"tx": "t2"})],
            vec!["peer-a".into(), "peer-b".into(), "peer-c".into()],
            CONFIRMED_BLOCK,
            &cancel,
            T0 + 60.0,
        )
        .unwrap();
    assert!(engine.validate_mesh_block_at(&mesh_block, T0 + 60.0).is_valid());

    let mined = engine
        .mine_block(vec![json!({"tx": "t1"})], ConnectivityMode::Offline, CONFIRMED_BLOCK, &cancel)
        .unwrap();
    assert!(mined.success);
    let block = mined.block.expect("successful result carries a block");
    engine.validate_block(&block, ConnectivityMode::Offline).unwrap();

    let operations = vec![operation("op-1", T0 + 120.0), operation("op-2", T0 + 180.0)];
    let signature = validator.sign(&online_message(CONFIRMED_BLOCK, &operations));
    let online = engine
        .transition_to_online_at(operations, &[signature], T0 + 600.0)
        .unwrap();
    assert_eq!(online.kind, TransitionKind::OnlineTransition);
    assert_eq!(online.offline_operations.len(), 2);
    assert_eq!(online.previous_proof, Some(offline.proof_hash().unwrap()));
    assert_eq!(engine.transition_state().unwrap(), TransitionState::Transitioning);

    engine.finalize_online().unwrap();
    assert_eq!(engine.transition_state().unwrap(), TransitionState::Online);
    assert_eq!(engine.transition_history().unwrap().len(), 2);
}

#[test]
fn test_duplicate_operations_refused() {
    let engine = test_engine();
    let validator = TestValidator::register(&engine, "validator-1");
    engine
        .transition_to_offline_at(
            CONFIRMED_BLOCK,
            &[validator.sign(&offline_message(CONFIRMED_BLOCK))],
            T0,
        )
        .unwrap();

    let operations = vec![operation("op-1", T0 + 10.0), operation("op-1", T0 + 20.0)];
    let signature = validator.sign(&online_message(CONFIRMED_BLOCK, &operations));
    let err = engine
        .transition_to_online_at(operations, &[signature], T0 + 30.0)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Transition(TransitionError::DuplicateOperation(ref id)) if id == "op-1"
    ));
    assert_eq!(engine.transition_state().unwrap(), TransitionState::Offline);
}

#[test]
fn test_unconfirmed_anchor_or_stranger_refused() {
    let engine = test_engine();
    let validator = TestValidator::register(&engine, "validator-1");

    let err = engine
        .transition_to_offline_at("fresh-block", &[validator.sign(&offline_message("fresh-block"))], T0)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Transition(TransitionError::InsufficientConfirmations { have: 0, .. })
    ));

    let stranger = TestValidator {
        node_id: "stranger".to_string(),
        keys: logichain_crypto::NodeKeys::generate(),
    };
    let err = engine
        .transition_to_offline_at(CONFIRMED_BLOCK, &[stranger.sign(&offline_message(CONFIRMED_BLOCK))], T0)
        .unwrap_err();
    assert!(matches!(err, EngineError::Transition(TransitionError::UnknownSigner(_))));
    assert_eq!(engine.transition_state().unwrap(), TransitionState::Online);
}
