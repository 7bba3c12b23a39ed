//! Online/offline transition state machine.
//!
//! A node cycles `Online -> Offline -> Transitioning -> Online`. Each switch
//! out of a stable mode is backed by a [`TransitionProof`] signed by
//! registered validators and appended to the transition history.
//!
//! # Security Invariants
//!
//! - Going offline requires the last online block to be confirmed
//! - Coming back online requires the offline period to stay under the limit
//!   and every offline operation id to be unique
//! - A refused transition leaves state and history untouched

use crate::error::{TransitionError, TransitionResult};
use logichain_core::config::TransitionConfig;
use logichain_core::hashing::{canonical_json_of, sha256_hex};
use logichain_core::time::{unix_now, Timestamp};
use logichain_crypto::{verify_signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionState {
    Online,
    Offline,
    Transitioning,
}

impl fmt::Display for TransitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionState::Online => write!(f, "online"),
            TransitionState::Offline => write!(f, "offline"),
            TransitionState::Transitioning => write!(f, "transitioning"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    OfflineTransition,
    OnlineTransition,
}

/// A validator's signature over a transition message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSignature {
    pub node_id: String,
    pub signature: Vec<u8>,
}

/// An operation performed while partitioned, replayed on reconnection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineOperation {
    pub id: String,
    pub kind: String,
    pub timestamp: Timestamp,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionProof {
    pub kind: TransitionKind,
    pub last_online_block: String,
    pub offline_operations: Vec<OfflineOperation>,
    /// Whole Unix seconds
    pub transition_timestamp: i64,
    pub signatures: Vec<NodeSignature>,
    /// Hash of the proof this one follows, for online transitions
    pub previous_proof: Option<String>,
}

impl TransitionProof {
    /// SHA-256 over the canonical JSON form of the proof.
    pub fn proof_hash(&self) -> logichain_core::Result<String> {
        Ok(sha256_hex(canonical_json_of(self)?))
    }
}

/// Reports how many confirmations a block has on the canonical chain.
pub trait ConfirmationSource: Send + Sync {
    /// `None` when the block is unknown.
    fn confirmations(&self, block_hash: &str) -> Option<u64>;
}

impl ConfirmationSource for HashMap<String, u64> {
    fn confirmations(&self, block_hash: &str) -> Option<u64> {
        self.get(block_hash).copied()
    }
}

pub fn offline_message(block_hash: &str) -> Vec<u8> {
    format!("offline:{}", block_hash).into_bytes()
}

pub fn online_message(last_online_block: &str, operations: &[OfflineOperation]) -> Vec<u8> {
    let ids: Vec<&str> = operations.iter().map(|op| op.id.as_str()).collect();
    format!("online:{}:{}", last_online_block, ids.join(",")).into_bytes()
}

pub struct TransitionManager {
    config: TransitionConfig,
    state: TransitionState,
    validators: HashMap<String, VerifyingKey>,
    history: Vec<TransitionProof>,
    offline_since: Option<Timestamp>,
    confirmations: Arc<dyn ConfirmationSource>,
}

impl fmt::Debug for TransitionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionManager")
            .field("state", &self.state)
            .field("validators", &self.validators.len())
            .field("history", &self.history.len())
            .field("offline_since", &self.offline_since)
            .finish()
    }
}

impl TransitionManager {
    pub fn new(config: TransitionConfig, confirmations: Arc<dyn ConfirmationSource>) -> Self {
        Self {
            config,
            state: TransitionState::Online,
            validators: HashMap::new(),
            history: Vec::new(),
            offline_since: None,
            confirmations,
        }
    }

    /// Register a validator whose signatures count toward transitions.
    pub fn register_validator(&mut self, node_id: impl Into<String>, key: VerifyingKey) {
        let node_id = node_id.into();
        debug!(node_id = %node_id, "Transition validator registered");
        self.validators.insert(node_id, key);
    }

    pub fn state(&self) -> TransitionState {
        self.state
    }

    /// Accepted proofs, oldest first.
    pub fn history(&self) -> &[TransitionProof] {
        &self.history
    }

    pub fn offline_since(&self) -> Option<Timestamp> {
        self.offline_since
    }

    fn require_state(&self, expected: TransitionState, to: TransitionState) -> TransitionResult<()> {
        if self.state != expected {
            warn!(from = %self.state, to = %to, "Invalid state transition attempted");
            return Err(TransitionError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    fn verify_signatures(&self, message: &[u8], signatures: &[NodeSignature]) -> TransitionResult<()> {
        let mut signers = HashSet::new();
        for sig in signatures {
            let key = self
                .validators
                .get(&sig.node_id)
                .ok_or_else(|| TransitionError::UnknownSigner(sig.node_id.clone()))?;
            verify_signature(key, message, &sig.signature).map_err(|source| {
                TransitionError::InvalidSignature {
                    node_id: sig.node_id.clone(),
                    source,
                }
            })?;
            signers.insert(sig.node_id.as_str());
        }

        if signers.len() < self.config.min_signatures {
            return Err(TransitionError::InsufficientSignatures {
                have: signers.len(),
                need: self.config.min_signatures,
            });
        }
        Ok(())
    }

    pub fn transition_to_offline(
        &mut self,
        block_hash: &str,
        signatures: &[NodeSignature],
    ) -> TransitionResult<&TransitionProof> {
        self.transition_to_offline_at(block_hash, signatures, unix_now())
    }

    /// Switch to offline mode anchored at `block_hash`.
    pub fn transition_to_offline_at(
        &mut self,
        block_hash: &str,
        signatures: &[NodeSignature],
        now: Timestamp,
    ) -> TransitionResult<&TransitionProof> {
        self.require_state(TransitionState::Online, TransitionState::Offline)?;

        let have = self.confirmations.confirmations(block_hash).unwrap_or(0);
        if have < self.config.min_confirmations {
            warn!(block_hash = %block_hash, have, need = self.config.min_confirmations, "Offline anchor not confirmed");
            return Err(TransitionError::InsufficientConfirmations {
                block_hash: block_hash.to_string(),
                have,
                need: self.config.min_confirmations,
            });
        }

        self.verify_signatures(&offline_message(block_hash), signatures)?;

        self.history.push(TransitionProof {
            kind: TransitionKind::OfflineTransition,
            last_online_block: block_hash.to_string(),
            offline_operations: Vec::new(),
            transition_timestamp: now as i64,
            signatures: signatures.to_vec(),
            previous_proof: None,
        });
        self.state = TransitionState::Offline;
        self.offline_since = Some(now);

        info!(block_hash = %block_hash, signers = signatures.len(), "Transitioned to offline mode");
        self.last_proof()
    }

    pub fn transition_to_online(
        &mut self,
        operations: Vec<OfflineOperation>,
        signatures: &[NodeSignature],
    ) -> TransitionResult<&TransitionProof> {
        self.transition_to_online_at(operations, signatures, unix_now())
    }

    /// Submit the offline operations and move to `Transitioning`.
    ///
    /// [`Self::finalize_online`] completes the switch once the operations
    /// have been replayed into the canonical chain.
    pub fn transition_to_online_at(
        &mut self,
        operations: Vec<OfflineOperation>,
        signatures: &[NodeSignature],
        now: Timestamp,
    ) -> TransitionResult<&TransitionProof> {
        self.require_state(TransitionState::Offline, TransitionState::Transitioning)?;

        let offline_proof = self.last_proof()?;
        let last_online_block = offline_proof.last_online_block.clone();
        let previous_proof = offline_proof.proof_hash()?;
        let offline_since = self
            .offline_since
            .unwrap_or(offline_proof.transition_timestamp as f64);

        let elapsed = now - offline_since;
        if elapsed > self.config.max_offline_secs {
            warn!(elapsed_secs = elapsed, "Offline period exceeded");
            return Err(TransitionError::OfflineTooLong {
                elapsed_secs: elapsed,
                max_secs: self.config.max_offline_secs,
            });
        }

        let mut seen = HashSet::new();
        for op in &operations {
            if !seen.insert(op.id.as_str()) {
                return Err(TransitionError::DuplicateOperation(op.id.clone()));
            }
            validate_operation(op, offline_since, now)?;
        }

        self.verify_signatures(&online_message(&last_online_block, &operations), signatures)?;

        let count = operations.len();
        self.history.push(TransitionProof {
            kind: TransitionKind::OnlineTransition,
            last_online_block,
            offline_operations: operations,
            transition_timestamp: now as i64,
            signatures: signatures.to_vec(),
            previous_proof: Some(previous_proof),
        });
        self.state = TransitionState::Transitioning;

        info!(operations = count, elapsed_secs = elapsed, "Transitioning to online mode");
        self.last_proof()
    }

    /// Complete a pending online transition.
    pub fn finalize_online(&mut self) -> TransitionResult<()> {
        self.require_state(TransitionState::Transitioning, TransitionState::Online)?;
        self.state = TransitionState::Online;
        self.offline_since = None;
        info!("Online mode restored");
        Ok(())
    }

    fn last_proof(&self) -> TransitionResult<&TransitionProof> {
        self.history
            .last()
            .ok_or_else(|| TransitionError::InvalidStateTransition {
                from: self.state.to_string(),
                to: "missing transition history".to_string(),
            })
    }
}

fn validate_operation(op: &OfflineOperation, offline_since: Timestamp, now: Timestamp) -> TransitionResult<()> {
    if op.id.is_empty() {
        return Err(TransitionError::InvalidOperation {
            id: op.id.clone(),
            reason: "empty id".to_string(),
        });
    }
    if !(op.timestamp >= offline_since && op.timestamp <= now) {
        return Err(TransitionError::InvalidOperation {
            id: op.id.clone(),
            reason: format!("timestamp {} outside offline window", op.timestamp),
        });
    }
    Ok(())
}
