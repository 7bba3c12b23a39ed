//! Proof-of-delivery replay scenarios

use crate::test_utils::*;
use logichain_crypto::NodeKeys;
use logichain_guard::PodLocation;
use serde_json::json;

#[test]
fn test_pod_accepted_exactly_once() {
    let engine = test_engine();
    let driver = NodeKeys::generate();
    let client = NodeKeys::generate();

    let pod = engine
        .create_pod_at(
            "c1",
            PodLocation::new(-33.86, 151.21),
            driver.signing_key(),
            client.signing_key(),
            json!({"parcel": "p-77"}),
            T0,
        )
        .unwrap();

    assert!(engine.verify_pod_at(&pod, &driver.verifying_key(), &client.verifying_key(), T0 + 30.0));
    for offset in [31.0, 3600.0, 86_000.0] {
        assert!(!engine.verify_pod_at(&pod, &driver.verifying_key(), &client.verifying_key(), T0 + offset));
    }
}

#[test]
fn test_distinct_pods_for_same_contract() {
    let engine = test_engine();
    let driver = NodeKeys::generate();
    let client = NodeKeys::generate();

    for _ in 0..5 {
        let pod = engine
            .create_pod_at(
                "c1",
                PodLocation::new(0.0, 0.0),
                driver.signing_key(),
                client.signing_key(),
                json!({}),
                T0,
            )
            .unwrap();
        assert!(engine.verify_pod_at(&pod, &driver.verifying_key(), &client.verifying_key(), T0));
    }
}

#[test]
fn test_stale_or_forged_pod_rejected() {
    let engine = test_engine();
    let driver = NodeKeys::generate();
    let client = NodeKeys::generate();
    let impostor = NodeKeys::generate();

    let pod = engine
        .create_pod_at(
            "c2",
            PodLocation::new(10.0, 10.0),
            driver.signing_key(),
            impostor.signing_key(),
            json!({}),
            T0,
        )
        .unwrap();

    assert!(!engine.verify_pod_at(&pod, &driver.verifying_key(), &client.verifying_key(), T0));
    assert!(!engine.verify_pod_at(&pod, &driver.verifying_key(), &impostor.verifying_key(), T0 + 90_000.0));
    // Rejections left no trace, so the genuine pairing still verifies.
    assert!(engine.verify_pod_at(&pod, &driver.verifying_key(), &impostor.verifying_key(), T0));
}
