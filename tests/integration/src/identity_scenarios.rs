//! Node challenge scenarios

use crate::test_utils::*;
use logichain_crypto::NodeKeys;
use logichain_identity::NodeChallengeProtocol;

#[test]
fn test_challenge_is_single_use() {
    let engine = test_engine();
    let issuer = NodeKeys::generate();
    let peer = NodeKeys::generate();

    let challenge = engine.create_challenge_at("peer-1", issuer.signing_key(), T0).unwrap();
    NodeChallengeProtocol::verify_challenge(&challenge, &issuer.verifying_key()).unwrap();

    let response = NodeChallengeProtocol::create_response_at(&challenge, "peer-1", peer.signing_key(), T0 + 1.0);
    engine.verify_response_at(&response, &peer.verifying_key(), T0 + 2.0).unwrap();
    assert!(engine.verify_response_at(&response, &peer.verifying_key(), T0 + 3.0).is_err());

    assert!(engine.is_node_verified_at("peer-1", T0 + 60.0).unwrap());
    assert!(!engine.is_node_verified_at("peer-1", T0 + 2.0 + 3601.0).unwrap());
}

#[test]
fn test_late_response_rejected() {
    let engine = test_engine();
    let issuer = NodeKeys::generate();
    let peer = NodeKeys::generate();

    let challenge = engine.create_challenge_at("peer-2", issuer.signing_key(), T0).unwrap();
    let response = NodeChallengeProtocol::create_response_at(&challenge, "peer-2", peer.signing_key(), T0 + 31.0);
    assert!(engine.verify_response_at(&response, &peer.verifying_key(), T0 + 31.0).is_err());
    assert!(!engine.is_node_verified_at("peer-2", T0 + 31.0).unwrap());
}
