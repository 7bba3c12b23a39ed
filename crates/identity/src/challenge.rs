//! Node challenge/response identity verification.
//!
//! A node proves it controls the key behind a claimed identity before the
//! consensus layer accepts data from it.
//!
//! # Protocol Flow
//!
//! 1. Issuer → Target: `Challenge` with a random 32-byte nonce, signed over
//!    `challenge_id:node_id:timestamp:nonce_hex`
//! 2. Target → Issuer: `Response` carrying `proof = SHA256(SHA256(nonce))`,
//!    signed over `challenge_id:node_id:timestamp:proof_hex`
//! 3. Issuer verifies and caches the node as verified
//!
//! # Security Properties
//!
//! - A challenge is consumed by the first valid response (single use)
//! - Responses must arrive within the challenge timeout (30s default)
//! - Verification is cached for a bounded window (1h default); stale
//!   entries read as unverified
//!
//! Timestamps inside signed messages use the legacy float framing so that
//! legacy and current nodes agree on the signed bytes.

use crate::error::{ChallengeError, ChallengeResult};
use logichain_core::config::ChallengeConfig;
use logichain_core::hashing::{sha256, sha256_hex};
use logichain_core::time::{legacy_timestamp, unix_now, Timestamp};
use logichain_crypto::{sign_message, verify_signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Size of a challenge nonce in bytes.
pub const NONCE_LENGTH: usize = 32;

/// An open identity challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: String,
    /// Node the challenge is addressed to
    pub node_id: String,
    pub timestamp: Timestamp,
    pub nonce: Vec<u8>,
    /// Issuer signature over the framed challenge message
    pub signature: Vec<u8>,
}

impl Challenge {
    /// Bytes the issuer signs.
    pub fn signing_message(&self) -> Vec<u8> {
        challenge_message(&self.challenge_id, &self.node_id, self.timestamp, &self.nonce)
    }
}

/// A node's answer to a [`Challenge`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub challenge_id: String,
    /// Node claiming the identity
    pub node_id: String,
    pub timestamp: Timestamp,
    /// Double SHA-256 of the challenge nonce
    pub proof: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Response {
    /// Bytes the responder signs.
    pub fn signing_message(&self) -> Vec<u8> {
        response_message(&self.challenge_id, &self.node_id, self.timestamp, &self.proof)
    }
}

/// Entries removed by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub expired_challenges: usize,
    pub expired_verifications: usize,
}

fn challenge_message(challenge_id: &str, node_id: &str, timestamp: Timestamp, nonce: &[u8]) -> Vec<u8> {
    format!(
        "{}:{}:{}:{}",
        challenge_id,
        node_id,
        legacy_timestamp(timestamp),
        hex::encode(nonce)
    )
    .into_bytes()
}

fn response_message(challenge_id: &str, node_id: &str, timestamp: Timestamp, proof: &[u8]) -> Vec<u8> {
    format!(
        "{}:{}:{}:{}",
        challenge_id,
        node_id,
        legacy_timestamp(timestamp),
        hex::encode(proof)
    )
    .into_bytes()
}

/// Proof of possession for a nonce: `SHA256(SHA256(nonce))`.
pub fn generate_proof(nonce: &[u8]) -> [u8; 32] {
    sha256(sha256(nonce))
}

/// Issues challenges and tracks verified peers.
///
/// Owns the open-challenge table and the verified-node cache. Callers that
/// share one instance across threads wrap it in a mutex so that two
/// responses to the same challenge cannot both succeed.
#[derive(Debug)]
pub struct NodeChallengeProtocol {
    config: ChallengeConfig,
    /// Open challenges by id
    active_challenges: HashMap<String, Challenge>,
    /// node id -> last successful verification
    verified_nodes: HashMap<String, Timestamp>,
}

impl NodeChallengeProtocol {
    pub fn new(config: ChallengeConfig) -> Self {
        Self {
            config,
            active_challenges: HashMap::new(),
            verified_nodes: HashMap::new(),
        }
    }

    /// Create and store a signed challenge for `target_node_id`.
    ///
    /// # Arguments
    /// * `target_node_id` - Node expected to answer
    /// * `issuer_key` - Key of the issuing node
    ///
    /// # Returns
    /// The challenge to send to the target.
    pub fn create_challenge(
        &mut self,
        target_node_id: &str,
        issuer_key: &SigningKey,
    ) -> ChallengeResult<Challenge> {
        self.create_challenge_at(target_node_id, issuer_key, unix_now())
    }

    pub fn create_challenge_at(
        &mut self,
        target_node_id: &str,
        issuer_key: &SigningKey,
        now: Timestamp,
    ) -> ChallengeResult<Challenge> {
        if target_node_id.is_empty() {
            return Err(ChallengeError::InvalidInput(
                "target node id must not be empty".to_string(),
            ));
        }

        let mut nonce = vec![0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce);

        let challenge_id = sha256_hex(format!(
            "{}:{}:{}",
            target_node_id,
            legacy_timestamp(now),
            hex::encode(&nonce)
        ));
        let signature = sign_message(
            issuer_key,
            &challenge_message(&challenge_id, target_node_id, now, &nonce),
        );

        let challenge = Challenge {
            challenge_id: challenge_id.clone(),
            node_id: target_node_id.to_string(),
            timestamp: now,
            nonce,
            signature,
        };
        self.active_challenges.insert(challenge_id, challenge.clone());

        debug!(
            node_id = %target_node_id,
            challenge_id = %challenge.challenge_id,
            "Issued identity challenge"
        );

        Ok(challenge)
    }

    /// Check the issuer's signature on a received challenge (responder side).
    pub fn verify_challenge(challenge: &Challenge, issuer_key: &VerifyingKey) -> ChallengeResult<()> {
        verify_signature(issuer_key, &challenge.signing_message(), &challenge.signature)?;
        Ok(())
    }

    /// Answer `challenge` as `node_id`.
    pub fn create_response(challenge: &Challenge, node_id: &str, key: &SigningKey) -> Response {
        Self::create_response_at(challenge, node_id, key, unix_now())
    }

    pub fn create_response_at(
        challenge: &Challenge,
        node_id: &str,
        key: &SigningKey,
        now: Timestamp,
    ) -> Response {
        let proof = generate_proof(&challenge.nonce).to_vec();
        let signature = sign_message(
            key,
            &response_message(&challenge.challenge_id, node_id, now, &proof),
        );

        Response {
            challenge_id: challenge.challenge_id.clone(),
            node_id: node_id.to_string(),
            timestamp: now,
            proof,
            signature,
        }
    }

    /// Verify a response against its open challenge.
    ///
    /// On success the node is cached as verified and the challenge is
    /// consumed. On failure nothing changes.
    ///
    /// # Errors
    /// The first failed check: unknown challenge, expiry, node mismatch,
    /// bad signature, or wrong proof.
    pub fn verify_response(
        &mut self,
        response: &Response,
        public_key: &VerifyingKey,
    ) -> ChallengeResult<()> {
        self.verify_response_at(response, public_key, unix_now())
    }

    pub fn verify_response_at(
        &mut self,
        response: &Response,
        public_key: &VerifyingKey,
        now: Timestamp,
    ) -> ChallengeResult<()> {
        let result = self.check_response(response, public_key, now);

        match &result {
            Ok(()) => {
                self.active_challenges.remove(&response.challenge_id);
                self.verified_nodes.insert(response.node_id.clone(), now);
                info!(node_id = %response.node_id, "Node identity verified");
            }
            Err(e) => {
                warn!(
                    node_id = %response.node_id,
                    challenge_id = %response.challenge_id,
                    error = %e,
                    "Challenge response rejected"
                );
            }
        }

        result
    }

    fn check_response(
        &self,
        response: &Response,
        public_key: &VerifyingKey,
        now: Timestamp,
    ) -> ChallengeResult<()> {
        let challenge = self
            .active_challenges
            .get(&response.challenge_id)
            .ok_or_else(|| ChallengeError::UnknownChallenge {
                challenge_id: response.challenge_id.clone(),
            })?;

        let age = now - challenge.timestamp;
        if age > self.config.challenge_timeout_secs {
            return Err(ChallengeError::Expired {
                challenge_id: challenge.challenge_id.clone(),
                age_secs: age,
            });
        }

        if response.node_id != challenge.node_id {
            return Err(ChallengeError::NodeMismatch {
                expected: challenge.node_id.clone(),
                actual: response.node_id.clone(),
            });
        }

        verify_signature(public_key, &response.signing_message(), &response.signature)?;

        if response.proof.as_slice() != generate_proof(&challenge.nonce).as_slice() {
            return Err(ChallengeError::InvalidProof);
        }

        Ok(())
    }

    /// Whether `node_id` passed a challenge within the cache window.
    pub fn is_node_verified(&self, node_id: &str) -> bool {
        self.is_node_verified_at(node_id, unix_now())
    }

    pub fn is_node_verified_at(&self, node_id: &str, now: Timestamp) -> bool {
        self.verified_nodes
            .get(node_id)
            .map(|verified_at| now - verified_at <= self.config.verification_cache_secs)
            .unwrap_or(false)
    }

    /// Purge timed-out challenges and stale verifications.
    pub fn cleanup_expired(&mut self) -> CleanupStats {
        self.cleanup_expired_at(unix_now())
    }

    pub fn cleanup_expired_at(&mut self, now: Timestamp) -> CleanupStats {
        let timeout = self.config.challenge_timeout_secs;
        let cache = self.config.verification_cache_secs;

        let challenges_before = self.active_challenges.len();
        self.active_challenges
            .retain(|_, c| now - c.timestamp <= timeout);
        let verifications_before = self.verified_nodes.len();
        self.verified_nodes.retain(|_, t| now - *t <= cache);

        let stats = CleanupStats {
            expired_challenges: challenges_before - self.active_challenges.len(),
            expired_verifications: verifications_before - self.verified_nodes.len(),
        };
        if stats != CleanupStats::default() {
            debug!(
                expired_challenges = stats.expired_challenges,
                expired_verifications = stats.expired_verifications,
                "Purged expired challenge state"
            );
        }
        stats
    }

    /// Number of challenges still awaiting a response.
    pub fn active_challenge_count(&self) -> usize {
        self.active_challenges.len()
    }
}

impl Default for NodeChallengeProtocol {
    fn default() -> Self {
        Self::new(ChallengeConfig::default())
    }
}
