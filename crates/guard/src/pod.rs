//! Proof-of-delivery replay protection.
//!
//! A POD is dual-signed by the driver and the client over
//! `"{contract_hash}:{nonce}:{timestamp}:{location}"` and is accepted at most
//! once. Replay checks go through a Bloom filter first; a positive answer is
//! confirmed against the exact set, which is authoritative.
//!
//! # Security Invariants
//!
//! - A POD id (`contract_hash:nonce`) accepted once is rejected forever
//! - Rejection never mutates the guard
//! - Metadata is carried but not signed

use crate::bloom::BloomFilter;
use crate::error::{PodError, PodResult};
use logichain_core::config::PodConfig;
use logichain_core::hashing::sha256_hex;
use logichain_core::time::{legacy_float, legacy_timestamp, unix_now, unix_now_nanos, Timestamp};
use logichain_crypto::{sign_message, verify_signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Delivery location in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PodLocation {
    pub lat: f64,
    pub lon: f64,
}

impl PodLocation {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Legacy signed framing: `{'lat': 1.5, 'lon': 2.0}`.
    pub fn framed(&self) -> String {
        format!("{{'lat': {}, 'lon': {}}}", legacy_float(self.lat), legacy_float(self.lon))
    }
}

/// A dual-signed proof of delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub contract_hash: String,
    pub nonce: String,
    pub timestamp: Timestamp,
    pub location: PodLocation,
    pub driver_signature: Vec<u8>,
    pub client_signature: Vec<u8>,
    pub metadata: Value,
}

impl Pod {
    pub fn pod_id(&self) -> String {
        pod_id(&self.contract_hash, &self.nonce)
    }

    pub fn signing_message(&self) -> Vec<u8> {
        signing_message(&self.contract_hash, &self.nonce, self.timestamp, &self.location)
    }
}

fn pod_id(contract_hash: &str, nonce: &str) -> String {
    format!("{}:{}", contract_hash, nonce)
}

fn signing_message(
    contract_hash: &str,
    nonce: &str,
    timestamp: Timestamp,
    location: &PodLocation,
) -> Vec<u8> {
    format!(
        "{}:{}:{}:{}",
        contract_hash,
        nonce,
        legacy_timestamp(timestamp),
        location.framed()
    )
    .into_bytes()
}

#[derive(Debug)]
pub struct PodReplayGuard {
    config: PodConfig,
    bloom: BloomFilter,
    used: HashSet<String>,
}

impl PodReplayGuard {
    pub fn new(config: PodConfig) -> PodResult<Self> {
        let bloom = BloomFilter::new(config.bloom_bits, config.bloom_hashes)?;
        Ok(Self {
            config,
            bloom,
            used: HashSet::new(),
        })
    }

    pub fn create_pod(
        &self,
        contract_hash: &str,
        location: PodLocation,
        driver_key: &SigningKey,
        client_key: &SigningKey,
        metadata: Value,
    ) -> PodResult<Pod> {
        self.create_pod_at(contract_hash, location, driver_key, client_key, metadata, unix_now())
    }

    /// Build and dual-sign a POD stamped `timestamp`.
    ///
    /// The nonce mixes in the high-resolution clock, so two PODs for the
    /// same contract and timestamp still get distinct ids.
    pub fn create_pod_at(
        &self,
        contract_hash: &str,
        location: PodLocation,
        driver_key: &SigningKey,
        client_key: &SigningKey,
        metadata: Value,
        timestamp: Timestamp,
    ) -> PodResult<Pod> {
        if contract_hash.is_empty() {
            return Err(PodError::Malformed("contract hash must not be empty".to_string()));
        }
        if !timestamp.is_finite() {
            return Err(PodError::Malformed("timestamp must be finite".to_string()));
        }

        let nonce = sha256_hex(format!(
            "{}:{}:{}",
            contract_hash,
            legacy_timestamp(timestamp),
            unix_now_nanos()
        ));
        let message = signing_message(contract_hash, &nonce, timestamp, &location);

        Ok(Pod {
            contract_hash: contract_hash.to_string(),
            nonce,
            timestamp,
            location,
            driver_signature: sign_message(driver_key, &message),
            client_signature: sign_message(client_key, &message),
            metadata,
        })
    }

    pub fn verify_pod(
        &mut self,
        pod: &Pod,
        driver_key: &VerifyingKey,
        client_key: &VerifyingKey,
    ) -> PodResult<()> {
        self.verify_pod_at(pod, driver_key, client_key, unix_now())
    }

    /// Accept a POD once.
    ///
    /// Checks run in order: timestamp window, replay, driver signature,
    /// client signature. Only a fully valid POD is marked used.
    pub fn verify_pod_at(
        &mut self,
        pod: &Pod,
        driver_key: &VerifyingKey,
        client_key: &VerifyingKey,
        now: Timestamp,
    ) -> PodResult<()> {
        let age = (now - pod.timestamp).abs();
        if age.is_nan() || age > self.config.max_pod_age_secs {
            debug!(contract = %pod.contract_hash, age_secs = age, "POD outside time window");
            return Err(PodError::StaleTimestamp {
                age_secs: age,
                max_secs: self.config.max_pod_age_secs,
            });
        }
        if pod.contract_hash.is_empty() || pod.nonce.is_empty() {
            return Err(PodError::Malformed("empty contract hash or nonce".to_string()));
        }

        let id = pod.pod_id();
        if self.is_used(&id) {
            warn!(pod_id = %id, "POD replay detected");
            return Err(PodError::Replay { pod_id: id });
        }

        let message = pod.signing_message();
        verify_signature(driver_key, &message, &pod.driver_signature)
            .map_err(PodError::DriverSignature)?;
        verify_signature(client_key, &message, &pod.client_signature)
            .map_err(PodError::ClientSignature)?;

        self.bloom.insert(&id);
        self.used.insert(id.clone());
        info!(pod_id = %id, "POD accepted");
        Ok(())
    }

    fn is_used(&self, id: &str) -> bool {
        // Negative filter answer is definitive.
        self.bloom.might_contain(id) && self.used.contains(id)
    }

    pub fn is_pod_used(&self, contract_hash: &str, nonce: &str) -> bool {
        self.is_used(&pod_id(contract_hash, nonce))
    }

    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    pub fn config(&self) -> &PodConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logichain_crypto::NodeKeys;
    use serde_json::json;

    const T0: f64 = 1_700_000_000.0;

    fn guard() -> PodReplayGuard {
        PodReplayGuard::new(PodConfig {
            bloom_bits: 1 << 16,
            ..PodConfig::default()
        })
        .unwrap()
    }

    fn signed_pod(guard: &PodReplayGuard, driver: &NodeKeys, client: &NodeKeys) -> Pod {
        guard
            .create_pod_at(
                "c1",
                PodLocation::new(52.5, 13.4),
                driver.signing_key(),
                client.signing_key(),
                json!({"items": 3}),
                T0,
            )
            .unwrap()
    }

    #[test]
    fn test_location_framing() {
        assert_eq!(PodLocation::new(1.0, -2.25).framed(), "{'lat': 1.0, 'lon': -2.25}");
    }

    #[test]
    fn test_verify_once_then_replay() {
        let mut guard = guard();
        let (driver, client) = (NodeKeys::generate(), NodeKeys::generate());
        let pod = signed_pod(&guard, &driver, &client);

        guard
            .verify_pod_at(&pod, &driver.verifying_key(), &client.verifying_key(), T0 + 5.0)
            .unwrap();
        assert!(guard.is_pod_used("c1", &pod.nonce));
        assert_eq!(guard.used_count(), 1);

        assert!(matches!(
            guard.verify_pod_at(&pod, &driver.verifying_key(), &client.verifying_key(), T0 + 6.0),
            Err(PodError::Replay { .. })
        ));
        assert_eq!(guard.used_count(), 1);
    }

    #[test]
    fn test_saturated_filter_falls_back_to_exact_set() {
        let mut guard = PodReplayGuard::new(PodConfig {
            bloom_bits: 64,
            ..PodConfig::default()
        })
        .unwrap();
        for i in 0..10_000 {
            guard.bloom.insert(format!("filler-{}", i));
        }
        let (driver, client) = (NodeKeys::generate(), NodeKeys::generate());

        for _ in 0..3 {
            let pod = signed_pod(&guard, &driver, &client);
            // Every filter bit is set, so only the exact set can answer.
            assert!(guard.bloom.might_contain(pod.pod_id()));
            assert!(!guard.is_pod_used("c1", &pod.nonce));

            guard
                .verify_pod_at(&pod, &driver.verifying_key(), &client.verifying_key(), T0)
                .unwrap();
            assert!(matches!(
                guard.verify_pod_at(&pod, &driver.verifying_key(), &client.verifying_key(), T0),
                Err(PodError::Replay { .. })
            ));
        }
        assert_eq!(guard.used_count(), 3);
    }

    #[test]
    fn test_nonces_are_unique() {
        let guard = guard();
        let (driver, client) = (NodeKeys::generate(), NodeKeys::generate());
        let a = signed_pod(&guard, &driver, &client);
        let b = signed_pod(&guard, &driver, &client);
        assert_ne!(a.nonce, b.nonce);
        assert_eq!(a.nonce.len(), 64);
    }

    #[test]
    fn test_stale_pod_rejected_without_mutation() {
        let mut guard = guard();
        let (driver, client) = (NodeKeys::generate(), NodeKeys::generate());
        let pod = signed_pod(&guard, &driver, &client);

        assert!(matches!(
            guard.verify_pod_at(&pod, &driver.verifying_key(), &client.verifying_key(), T0 + 86_401.0),
            Err(PodError::StaleTimestamp { .. })
        ));
        assert!(matches!(
            guard.verify_pod_at(&pod, &driver.verifying_key(), &client.verifying_key(), T0 - 86_401.0),
            Err(PodError::StaleTimestamp { .. })
        ));
        assert_eq!(guard.used_count(), 0);
    }

    #[test]
    fn test_swapped_keys_rejected() {
        let mut guard = guard();
        let (driver, client) = (NodeKeys::generate(), NodeKeys::generate());
        let pod = signed_pod(&guard, &driver, &client);

        assert!(matches!(
            guard.verify_pod_at(&pod, &client.verifying_key(), &client.verifying_key(), T0),
            Err(PodError::DriverSignature(_))
        ));
        assert!(matches!(
            guard.verify_pod_at(&pod, &driver.verifying_key(), &driver.verifying_key(), T0),
            Err(PodError::ClientSignature(_))
        ));
        assert!(!guard.is_pod_used("c1", &pod.nonce));
    }

    #[test]
    fn test_tampered_location_rejected() {
        let mut guard = guard();
        let (driver, client) = (NodeKeys::generate(), NodeKeys::generate());
        let mut pod = signed_pod(&guard, &driver, &client);
        pod.location.lat += 0.001;

        assert!(guard
            .verify_pod_at(&pod, &driver.verifying_key(), &client.verifying_key(), T0)
            .is_err());
    }

    #[test]
    fn test_metadata_not_signed() {
        let mut guard = guard();
        let (driver, client) = (NodeKeys::generate(), NodeKeys::generate());
        let mut pod = signed_pod(&guard, &driver, &client);
        pod.metadata = json!({"note": "edited"});

        assert!(guard
            .verify_pod_at(&pod, &driver.verifying_key(), &client.verifying_key(), T0)
            .is_ok());
    }

    #[test]
    fn test_empty_contract_rejected() {
        let guard = guard();
        let keys = NodeKeys::generate();
        assert!(matches!(
            guard.create_pod_at(
                "",
                PodLocation::new(0.0, 0.0),
                keys.signing_key(),
                keys.signing_key(),
                Value::Null,
                T0
            ),
            Err(PodError::Malformed(_))
        ));
    }

    #[test]
    fn test_zero_bloom_config_rejected() {
        let config = PodConfig {
            bloom_bits: 0,
            ..PodConfig::default()
        };
        assert!(matches!(PodReplayGuard::new(config), Err(PodError::InvalidFilter(_))));
    }
}
