//! Double-spend and blacklist scenarios

use crate::test_utils::*;
use logichain_guard::{OutputRef, SpendAttemptType};

#[test]
fn test_confirmed_input_is_always_double_spend() {
    let engine = test_engine();
    let input = vec![OutputRef::new("tx1", 0)];

    assert!(engine
        .check_spend_attempt_at("tx2", "alice", &input, 5.0, 1, T0)
        .unwrap()
        .is_none());
    engine.confirm_spend("tx2", &input).unwrap();

    for (i, wallet) in ["alice", "bob", "carol"].iter().enumerate() {
        let attempt = engine
            .check_spend_attempt_at(&format!("replay-{}", i), wallet, &input, 5.0, 100 + i as u64, T0 + 60.0)
            .unwrap()
            .expect("confirmed input must be flagged");
        assert_eq!(attempt.attempt_type, SpendAttemptType::DoubleSpend);
        assert!(attempt.is_malicious);
    }
}

#[test]
fn test_three_strikes_blacklist_rejects_valid_spend() {
    let engine = test_engine();
    let spent = vec![OutputRef::new("tx1", 0)];
    engine.confirm_spend("tx-origin", &spent).unwrap();

    for strike in 0..3 {
        let attempt = engine
            .check_spend_attempt_at(&format!("w-{}", strike), "W", &spent, 1.0, strike, T0 + strike as f64 * 3600.0)
            .unwrap()
            .unwrap();
        assert!(attempt.is_malicious);
    }
    assert!(engine.wallet_status("W").unwrap().is_blacklisted);

    let fresh = vec![OutputRef::new("untouched", 7)];
    let rejected = engine
        .check_spend_attempt_at("w-clean", "W", &fresh, 1.0, 99, T0 + 4.0 * 3600.0)
        .unwrap()
        .expect("blacklisted wallet must be rejected");
    assert!(rejected.is_malicious);
    assert_eq!(rejected.reason, "Blacklisted wallet");

    let report = engine.audit_report().unwrap();
    assert_eq!(report.blacklist_events.len(), 1);
    assert_eq!(report.blacklist_events[0].wallet, "W");
    // Retries from a blacklisted wallet are counted but not re-logged.
    assert_eq!(report.malicious_attempts.len(), 3);
    assert_eq!(engine.wallet_status("W").unwrap().malicious_attempts, 4);
}

#[test]
fn test_pending_conflict_then_release() {
    let engine = test_engine();
    let input = vec![OutputRef::new("tx9", 1)];

    engine.check_spend_attempt_at("first", "alice", &input, 1.0, 1, T0).unwrap();
    let conflict = engine
        .check_spend_attempt_at("second", "bob", &input, 1.0, 1, T0 + 1.0)
        .unwrap()
        .unwrap();
    assert!(!conflict.is_malicious);

    assert_eq!(engine.release_pending("first", &input).unwrap(), 1);
    assert!(engine
        .check_spend_attempt_at("second", "bob", &input, 1.0, 1, T0 + 2.0)
        .unwrap()
        .is_none());
    assert!(!engine.wallet_status("bob").unwrap().is_blacklisted);
}

#[test]
fn test_malformed_spend_is_an_error() {
    let engine = test_engine();
    assert!(engine.check_spend_attempt_at("tx", "w", &[], 1.0, 0, T0).is_err());
    assert!(engine
        .check_spend_attempt_at("tx", "w", &[OutputRef::new("in", 0)], -1.0, 0, T0)
        .is_err());
}
