//! The consensus engine: one instance per node, owning all mutable
//! consensus state.
//!
//! Each component sits behind its own mutex and locks are held only for
//! the duration of a single component call. Mining clones the controller
//! out of its lock so a long nonce search never blocks admission.

use crate::error::{EngineError, EngineResult};
use crate::fork::{ChainSide, ForkReason, ForkResolution, ForkResolver, SuspiciousFork};
use crate::mining::{DualMiningController, MinedBlock, MiningResult};
use logichain_core::config::ConsensusConfig;
use logichain_core::time::{unix_now, Timestamp};
use logichain_core::types::{ChainError, ChainInfo, ConnectivityMode};
use logichain_crypto::{SigningKey, VerifyingKey};
use logichain_guard::{
    BlacklistEvent, ConfirmationSource, DoubleSpendDetector, NodeSignature, OfflineOperation,
    OutputRef, Pod, PodLocation, PodReplayGuard, SpendAttempt, TransitionManager,
    TransitionProof, TransitionState, WalletStatus,
};
use logichain_identity::{Challenge, CleanupStats, NodeChallengeProtocol, Response};
use logichain_trust_mesh::{
    ChainScore, ChainScoreValidator, MeshBlock, MeshHasher, MeshNode, MeshNodeRegistry,
    MeshProof, MeshProofManager, MeshValidation, SignedClock,
};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Security events for a monitoring collaborator.
#[derive(Debug, Clone)]
pub struct AuditReport {
    pub suspicious_forks: Vec<SuspiciousFork>,
    /// Malicious spend detections only; benign conflicts are left out
    pub malicious_attempts: Vec<SpendAttempt>,
    pub blacklist_events: Vec<BlacklistEvent>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, component: &'static str) -> EngineResult<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| {
        error!(component, "Consensus state lock poisoned");
        EngineError::StatePoisoned(component)
    })
}

pub struct ConsensusEngine {
    node_id: String,
    config: Arc<ConsensusConfig>,
    chain_score: ChainScoreValidator,
    mesh_hasher: MeshHasher,
    mesh_proofs: MeshProofManager,
    fork: Mutex<ForkResolver>,
    spends: Mutex<DoubleSpendDetector>,
    pods: Mutex<PodReplayGuard>,
    challenges: Mutex<NodeChallengeProtocol>,
    transitions: Mutex<TransitionManager>,
    mining: Mutex<DualMiningController>,
    mesh_nodes: Mutex<MeshNodeRegistry>,
}

impl std::fmt::Debug for ConsensusEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusEngine")
            .field("node_id", &self.node_id)
            .finish_non_exhaustive()
    }
}

impl ConsensusEngine {
    /// Build an engine from validated rules.
    ///
    /// `confirmations` is the storage collaborator consulted before going
    /// offline.
    pub fn new(
        node_id: impl Into<String>,
        config: Arc<ConsensusConfig>,
        confirmations: Arc<dyn ConfirmationSource>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let node_id = node_id.into();

        let engine = Self {
            chain_score: ChainScoreValidator::new(config.chain_score.clone()),
            mesh_hasher: MeshHasher::new(&config.mesh),
            mesh_proofs: MeshProofManager::new(&config.mesh),
            fork: Mutex::new(ForkResolver::new(config.fork.clone())),
            spends: Mutex::new(DoubleSpendDetector::new(config.double_spend.clone())),
            pods: Mutex::new(PodReplayGuard::new(config.pod.clone())?),
            challenges: Mutex::new(NodeChallengeProtocol::new(config.challenge.clone())),
            transitions: Mutex::new(TransitionManager::new(config.transition.clone(), confirmations)),
            mining: Mutex::new(DualMiningController::new(node_id.clone(), config.mining.clone())),
            mesh_nodes: Mutex::new(MeshNodeRegistry::new(config.mesh.node_timeout_secs)),
            node_id,
            config,
        };

        info!(node_id = %engine.node_id, "Consensus engine initialized");
        Ok(engine)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    // Fork resolution

    pub fn resolve_fork(&self, online: &Arc<ChainInfo>, offline: &Arc<ChainInfo>) -> ForkResolution {
        self.resolve_fork_at(online, offline, unix_now())
    }

    /// Never fails; a poisoned resolver degrades to online, flagged.
    pub fn resolve_fork_at(
        &self,
        online: &Arc<ChainInfo>,
        offline: &Arc<ChainInfo>,
        now: Timestamp,
    ) -> ForkResolution {
        match lock(&self.fork, "fork_resolver") {
            Ok(mut resolver) => resolver.resolve_fork_at(online, offline, now),
            Err(e) => ForkResolution {
                winner: ChainSide::Online,
                reason: ForkReason::Error(e.to_string()),
                suspicious: true,
                metrics: None,
            },
        }
    }

    // Double-spend detection

    pub fn check_spend_attempt(
        &self,
        tx_id: &str,
        wallet: &str,
        inputs: &[OutputRef],
        amount: f64,
        nonce: u64,
    ) -> EngineResult<Option<SpendAttempt>> {
        self.check_spend_attempt_at(tx_id, wallet, inputs, amount, nonce, unix_now())
    }

    pub fn check_spend_attempt_at(
        &self,
        tx_id: &str,
        wallet: &str,
        inputs: &[OutputRef],
        amount: f64,
        nonce: u64,
        now: Timestamp,
    ) -> EngineResult<Option<SpendAttempt>> {
        Ok(lock(&self.spends, "double_spend")?
            .check_spend_attempt_at(tx_id, wallet, inputs, amount, nonce, now)?)
    }

    pub fn confirm_spend(&self, tx_id: &str, inputs: &[OutputRef]) -> EngineResult<()> {
        Ok(lock(&self.spends, "double_spend")?.confirm_spend(tx_id, inputs)?)
    }

    pub fn release_pending(&self, tx_id: &str, inputs: &[OutputRef]) -> EngineResult<usize> {
        Ok(lock(&self.spends, "double_spend")?.release_pending(tx_id, inputs)?)
    }

    pub fn wallet_status(&self, wallet: &str) -> EngineResult<WalletStatus> {
        Ok(lock(&self.spends, "double_spend")?.wallet_status(wallet))
    }

    pub fn cleanup_old_pending_at(&self, now: Timestamp) -> EngineResult<usize> {
        Ok(lock(&self.spends, "double_spend")?.cleanup_old_pending_at(now))
    }

    // Proof of delivery

    pub fn create_pod(
        &self,
        contract_hash: &str,
        location: PodLocation,
        driver_key: &SigningKey,
        client_key: &SigningKey,
        metadata: Value,
    ) -> EngineResult<Pod> {
        self.create_pod_at(contract_hash, location, driver_key, client_key, metadata, unix_now())
    }

    pub fn create_pod_at(
        &self,
        contract_hash: &str,
        location: PodLocation,
        driver_key: &SigningKey,
        client_key: &SigningKey,
        metadata: Value,
        now: Timestamp,
    ) -> EngineResult<Pod> {
        Ok(lock(&self.pods, "pod_guard")?
            .create_pod_at(contract_hash, location, driver_key, client_key, metadata, now)?)
    }

    pub fn verify_pod(&self, pod: &Pod, driver_key: &VerifyingKey, client_key: &VerifyingKey) -> bool {
        self.verify_pod_at(pod, driver_key, client_key, unix_now())
    }

    /// Fail closed: any rejection or internal error returns `false`.
    pub fn verify_pod_at(
        &self,
        pod: &Pod,
        driver_key: &VerifyingKey,
        client_key: &VerifyingKey,
        now: Timestamp,
    ) -> bool {
        let verdict = lock(&self.pods, "pod_guard").and_then(|mut guard| {
            guard
                .verify_pod_at(pod, driver_key, client_key, now)
                .map_err(EngineError::from)
        });
        match verdict {
            Ok(()) => true,
            Err(e) => {
                warn!(contract = %pod.contract_hash, error = %e, "POD rejected");
                false
            }
        }
    }

    // Node challenge protocol

    pub fn create_challenge(&self, target_node_id: &str, issuer_key: &SigningKey) -> EngineResult<Challenge> {
        self.create_challenge_at(target_node_id, issuer_key, unix_now())
    }

    pub fn create_challenge_at(
        &self,
        target_node_id: &str,
        issuer_key: &SigningKey,
        now: Timestamp,
    ) -> EngineResult<Challenge> {
        Ok(lock(&self.challenges, "challenge")?.create_challenge_at(target_node_id, issuer_key, now)?)
    }

    pub fn create_response(&self, challenge: &Challenge, key: &SigningKey) -> Response {
        NodeChallengeProtocol::create_response(challenge, &self.node_id, key)
    }

    pub fn verify_response(&self, response: &Response, key: &VerifyingKey) -> EngineResult<()> {
        self.verify_response_at(response, key, unix_now())
    }

    pub fn verify_response_at(
        &self,
        response: &Response,
        key: &VerifyingKey,
        now: Timestamp,
    ) -> EngineResult<()> {
        Ok(lock(&self.challenges, "challenge")?.verify_response_at(response, key, now)?)
    }

    pub fn is_node_verified(&self, node_id: &str) -> EngineResult<bool> {
        self.is_node_verified_at(node_id, unix_now())
    }

    pub fn is_node_verified_at(&self, node_id: &str, now: Timestamp) -> EngineResult<bool> {
        Ok(lock(&self.challenges, "challenge")?.is_node_verified_at(node_id, now))
    }

    pub fn cleanup_challenges_at(&self, now: Timestamp) -> EngineResult<CleanupStats> {
        Ok(lock(&self.challenges, "challenge")?.cleanup_expired_at(now))
    }

    // Chain scoring

    pub fn calculate_chain_score(&self, chain: &ChainInfo, now: Timestamp) -> Result<ChainScore, ChainError> {
        self.chain_score.calculate_chain_score(&chain.blocks, now)
    }

    pub fn is_chain_suspicious(&self, score: &ChainScore) -> bool {
        self.chain_score.is_chain_suspicious(score)
    }

    pub fn validate_signed_clock_at(
        &self,
        clock: &SignedClock,
        key: &VerifyingKey,
        now: Timestamp,
    ) -> EngineResult<()> {
        Ok(self.chain_score.validate_signed_clock_at(clock, key, now)?)
    }

    // Mesh

    pub fn create_mesh_block_at(
        &self,
        transactions: Vec<Value>,
        validators: Vec<String>,
        previous_hash: &str,
        cancel: &CancellationToken,
        now: Timestamp,
    ) -> EngineResult<MeshBlock> {
        Ok(self
            .mesh_hasher
            .create_mesh_block_at(transactions, validators, previous_hash, cancel, now)?)
    }

    pub fn validate_mesh_block_at(&self, block: &MeshBlock, now: Timestamp) -> MeshValidation {
        self.mesh_hasher
            .validate_mesh_block_at(block, self.mesh_hasher.required_validators(), now)
    }

    pub fn create_mesh_proof(
        &self,
        validators: Vec<String>,
        hop_count: u32,
        timestamp: Timestamp,
        signatures: &[Vec<u8>],
    ) -> EngineResult<MeshProof> {
        Ok(self
            .mesh_proofs
            .create_mesh_proof(&self.node_id, validators, hop_count, timestamp, signatures)?)
    }

    pub fn verify_mesh_proof_at(&self, proof: &MeshProof, now: Timestamp) -> EngineResult<()> {
        Ok(self.mesh_proofs.verify_mesh_proof_at(proof, now)?)
    }

    pub fn register_mesh_node(&self, node: MeshNode) -> EngineResult<()> {
        lock(&self.mesh_nodes, "mesh_nodes")?.add_node(node);
        Ok(())
    }

    pub fn update_node_reputation_at(&self, node_id: &str, success: bool, now: Timestamp) -> EngineResult<f64> {
        Ok(lock(&self.mesh_nodes, "mesh_nodes")?.update_node_reputation_at(node_id, success, now)?)
    }

    pub fn mesh_node(&self, node_id: &str) -> EngineResult<Option<MeshNode>> {
        Ok(lock(&self.mesh_nodes, "mesh_nodes")?.node(node_id).cloned())
    }

    pub fn prune_stale_nodes_at(&self, now: Timestamp) -> EngineResult<usize> {
        Ok(lock(&self.mesh_nodes, "mesh_nodes")?.prune_stale_nodes_at(now))
    }

    // Connectivity transitions

    pub fn register_validator(&self, node_id: &str, key: VerifyingKey) -> EngineResult<()> {
        lock(&self.transitions, "transition")?.register_validator(node_id, key);
        Ok(())
    }

    pub fn transition_state(&self) -> EngineResult<TransitionState> {
        Ok(lock(&self.transitions, "transition")?.state())
    }

    pub fn transition_history(&self) -> EngineResult<Vec<TransitionProof>> {
        Ok(lock(&self.transitions, "transition")?.history().to_vec())
    }

    pub fn transition_to_offline(&self, block_hash: &str, signatures: &[NodeSignature]) -> EngineResult<TransitionProof> {
        self.transition_to_offline_at(block_hash, signatures, unix_now())
    }

    pub fn transition_to_offline_at(
        &self,
        block_hash: &str,
        signatures: &[NodeSignature],
        now: Timestamp,
    ) -> EngineResult<TransitionProof> {
        let mut manager = lock(&self.transitions, "transition")?;
        Ok(manager.transition_to_offline_at(block_hash, signatures, now)?.clone())
    }

    pub fn transition_to_online(
        &self,
        operations: Vec<OfflineOperation>,
        signatures: &[NodeSignature],
    ) -> EngineResult<TransitionProof> {
        self.transition_to_online_at(operations, signatures, unix_now())
    }

    pub fn transition_to_online_at(
        &self,
        operations: Vec<OfflineOperation>,
        signatures: &[NodeSignature],
        now: Timestamp,
    ) -> EngineResult<TransitionProof> {
        let mut manager = lock(&self.transitions, "transition")?;
        Ok(manager.transition_to_online_at(operations, signatures, now)?.clone())
    }

    pub fn finalize_online(&self) -> EngineResult<()> {
        Ok(lock(&self.transitions, "transition")?.finalize_online()?)
    }

    // Mining

    /// Mine outside the controller lock; difficulty adjustments made while
    /// a search runs apply to the next block.
    pub fn mine_block(
        &self,
        transactions: Vec<Value>,
        mode: ConnectivityMode,
        previous_hash: &str,
        cancel: &CancellationToken,
    ) -> EngineResult<MiningResult> {
        self.mine_block_at(transactions, mode, previous_hash, cancel, unix_now())
    }

    pub fn mine_block_at(
        &self,
        transactions: Vec<Value>,
        mode: ConnectivityMode,
        previous_hash: &str,
        cancel: &CancellationToken,
        now: Timestamp,
    ) -> EngineResult<MiningResult> {
        let controller = lock(&self.mining, "mining")?.clone();
        Ok(controller.mine_block_at(transactions, mode, previous_hash, cancel, now)?)
    }

    pub fn validate_block(&self, block: &MinedBlock, mode: ConnectivityMode) -> EngineResult<()> {
        Ok(lock(&self.mining, "mining")?.validate_block(block, mode)?)
    }

    pub fn adjust_difficulty(&self, mode: ConnectivityMode, avg_block_secs: f64) -> EngineResult<u32> {
        Ok(lock(&self.mining, "mining")?.adjust_difficulty(mode, avg_block_secs))
    }

    pub fn estimate_power_usage(&self, transaction_count: usize, mode: ConnectivityMode) -> EngineResult<u32> {
        Ok(lock(&self.mining, "mining")?.estimate_power_usage(transaction_count, mode))
    }

    // Audit

    /// Snapshot of every security event recorded so far.
    pub fn audit_report(&self) -> EngineResult<AuditReport> {
        let suspicious_forks = lock(&self.fork, "fork_resolver")?.audit_queue();
        let spends = lock(&self.spends, "double_spend")?;
        Ok(AuditReport {
            suspicious_forks,
            malicious_attempts: spends
                .audit_log()
                .filter(|a| a.is_malicious)
                .cloned()
                .collect(),
            blacklist_events: spends.blacklist_events().to_vec(),
        })
    }

    pub fn clear_fork_audit_queue(&self) -> EngineResult<()> {
        lock(&self.fork, "fork_resolver")?.clear_audit_queue();
        Ok(())
    }
}
