//! Mesh proofs: attestations that enough validators witnessed an event
//! within a bounded number of radio hops.

use crate::error::{MeshError, MeshResult};
use logichain_core::config::MeshConfig;
use logichain_core::hashing::sha256_hex;
use logichain_core::time::{legacy_timestamp, unix_now, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshProof {
    pub node_id: String,
    pub validators: Vec<String>,
    pub hop_count: u32,
    pub timestamp: Timestamp,
    /// Validator signatures, hex encoded
    pub signatures: Vec<String>,
    pub proof_hash: String,
}

/// `sha256_hex("{node_id}:{validators joined by ','}:{timestamp}")`
///
/// Validator order is significant.
pub fn proof_hash(node_id: &str, validators: &[String], timestamp: Timestamp) -> String {
    sha256_hex(format!(
        "{}:{}:{}",
        node_id,
        validators.join(","),
        legacy_timestamp(timestamp)
    ))
}

#[derive(Debug, Clone)]
pub struct MeshProofManager {
    required_validators: usize,
    max_hop_distance: u32,
    max_age_secs: f64,
}

impl MeshProofManager {
    pub fn new(config: &MeshConfig) -> Self {
        Self {
            required_validators: config.proof_required_validators,
            max_hop_distance: config.max_hop_distance,
            max_age_secs: config.proof_max_age_secs,
        }
    }

    fn check_shape(&self, validators: &[String], hop_count: u32) -> MeshResult<()> {
        if validators.len() < self.required_validators {
            return Err(MeshError::InsufficientValidators {
                have: validators.len(),
                need: self.required_validators,
            });
        }
        if hop_count > self.max_hop_distance {
            return Err(MeshError::HopDistanceTooLarge {
                hops: hop_count,
                max: self.max_hop_distance,
            });
        }
        Ok(())
    }

    /// Build a proof, rejecting too few validators or too many hops.
    pub fn create_mesh_proof(
        &self,
        node_id: &str,
        validators: Vec<String>,
        hop_count: u32,
        timestamp: Timestamp,
        signatures: &[Vec<u8>],
    ) -> MeshResult<MeshProof> {
        self.check_shape(&validators, hop_count)?;

        let proof_hash = proof_hash(node_id, &validators, timestamp);
        Ok(MeshProof {
            node_id: node_id.to_string(),
            validators,
            hop_count,
            timestamp,
            signatures: signatures.iter().map(hex::encode).collect(),
            proof_hash,
        })
    }

    pub fn verify_mesh_proof(&self, proof: &MeshProof) -> MeshResult<()> {
        self.verify_mesh_proof_at(proof, unix_now())
    }

    /// Re-check shape, freshness and the proof hash.
    pub fn verify_mesh_proof_at(&self, proof: &MeshProof, now: Timestamp) -> MeshResult<()> {
        self.check_shape(&proof.validators, proof.hop_count)?;

        let age = (now - proof.timestamp).abs();
        if age.is_nan() || age > self.max_age_secs {
            return Err(MeshError::StaleProof {
                age_secs: age,
                max_secs: self.max_age_secs,
            });
        }

        if proof_hash(&proof.node_id, &proof.validators, proof.timestamp) != proof.proof_hash {
            return Err(MeshError::ProofHashMismatch);
        }

        debug!(
            node_id = %proof.node_id,
            validators = proof.validators.len(),
            hops = proof.hop_count,
            "Mesh proof verified"
        );
        Ok(())
    }
}

impl Default for MeshProofManager {
    fn default() -> Self {
        Self::new(&MeshConfig::default())
    }
}
