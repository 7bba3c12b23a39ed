//! Double-spend detection.
//!
//! Tracks which transaction outputs are consumed, which are locked by an
//! in-flight transaction, and which wallets keep trying to reuse them.
//!
//! # Security Invariants
//!
//! - The spent-output set only grows: a confirmed output never spends again
//! - An output carries at most one live lock; locks expire after the lock
//!   window (1h default)
//! - A live lock held by another submission is a benign conflict, never a
//!   strike against the wallet
//! - Three malicious attempts by a wallet inside 24h blacklist it, and a
//!   blacklisted wallet is rejected on every later attempt
//!
//! Detections and conflicts go to the audit log, which keeps entries for
//! the retention window and never more than [`MAX_AUDIT_ENTRIES`]. Per-wallet
//! counters and blacklist events are not trimmed.

use crate::error::{SpendError, SpendResult};
use logichain_core::config::DoubleSpendConfig;
use logichain_core::time::{unix_now, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use tracing::{debug, info, warn};

/// A transaction output consumed as an input, `tx_id:index`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub tx_id: String,
    pub index: u32,
}

impl OutputRef {
    pub fn new(tx_id: impl Into<String>, index: u32) -> Self {
        Self {
            tx_id: tx_id.into(),
            index,
        }
    }

    /// Key used in the spent and pending tables.
    pub fn input_id(&self) -> String {
        format!("{}:{}", self.tx_id, self.index)
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpendAttemptType {
    DoubleSpend,
    Replay,
    BalanceOverflow,
    NonceReuse,
}

impl fmt::Display for SpendAttemptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SpendAttemptType::DoubleSpend => "DOUBLE_SPEND",
            SpendAttemptType::Replay => "REPLAY",
            SpendAttemptType::BalanceOverflow => "BALANCE_OVERFLOW",
            SpendAttemptType::NonceReuse => "NONCE_REUSE",
        };
        f.write_str(label)
    }
}

/// A detected spend problem. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendAttempt {
    pub tx_id: String,
    pub wallet: String,
    pub attempt_type: SpendAttemptType,
    pub timestamp: Timestamp,
    /// Offending input, when one input triggered the detection
    pub input: Option<String>,
    pub reason: String,
    /// False for benign conflicts the caller may retry
    pub is_malicious: bool,
}

/// Security summary for one wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletStatus {
    pub is_blacklisted: bool,
    pub total_attempts: usize,
    pub malicious_attempts: usize,
    /// `0.0` when the wallet has no recorded attempts
    pub last_attempt: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlacklistEvent {
    pub wallet: String,
    pub timestamp: Timestamp,
    /// Malicious attempts inside the window when the wallet was blacklisted
    pub attempts: usize,
}

#[derive(Debug, Clone)]
struct PendingLock {
    tx_id: String,
    locked_at: Timestamp,
}

/// Lifetime counters plus the malicious timestamps still inside the
/// blacklist window.
#[derive(Debug, Clone, Default)]
struct WalletRecord {
    total_attempts: usize,
    malicious_attempts: usize,
    last_attempt: Timestamp,
    strikes: VecDeque<Timestamp>,
}

impl WalletRecord {
    fn expire_strikes(&mut self, now: Timestamp, window: f64) {
        while let Some(&oldest) = self.strikes.front() {
            if now - oldest < window {
                break;
            }
            self.strikes.pop_front();
        }
    }
}

#[derive(Debug, Clone)]
struct NonceBinding {
    tx_id: String,
    bound_at: Timestamp,
    confirmed: bool,
}

/// Reasons recorded on detections.
pub const REASON_BLACKLISTED: &str = "Blacklisted wallet";
pub const REASON_ALREADY_SPENT: &str = "Already spent";
pub const REASON_PENDING: &str = "Pending spend";
pub const REASON_NONCE_REUSED: &str = "Nonce already used by another transaction";

/// Hard cap on audit entries; the oldest go first.
pub const MAX_AUDIT_ENTRIES: usize = 100_000;

#[derive(Debug)]
pub struct DoubleSpendDetector {
    config: DoubleSpendConfig,
    spent_outputs: HashSet<String>,
    pending_spends: HashMap<String, PendingLock>,
    audit_log: VecDeque<SpendAttempt>,
    wallets: HashMap<String, WalletRecord>,
    blacklisted_wallets: HashSet<String>,
    blacklist_events: Vec<BlacklistEvent>,
    nonces: HashMap<(String, u64), NonceBinding>,
    nonce_by_tx: HashMap<String, (String, u64)>,
}

impl DoubleSpendDetector {
    pub fn new(config: DoubleSpendConfig) -> Self {
        Self {
            config,
            spent_outputs: HashSet::new(),
            pending_spends: HashMap::new(),
            audit_log: VecDeque::new(),
            wallets: HashMap::new(),
            blacklisted_wallets: HashSet::new(),
            blacklist_events: Vec::new(),
            nonces: HashMap::new(),
            nonce_by_tx: HashMap::new(),
        }
    }

    /// Check a spend and lock its inputs when it is clean.
    ///
    /// # Returns
    /// * `Ok(None)` - no conflict; every input is now locked for `tx_id`
    /// * `Ok(Some(attempt))` - a detection or a benign conflict; nothing locked
    /// * `Err(SpendError)` - malformed request
    pub fn check_spend_attempt(
        &mut self,
        tx_id: &str,
        wallet: &str,
        inputs: &[OutputRef],
        amount: f64,
        nonce: u64,
    ) -> SpendResult<Option<SpendAttempt>> {
        self.check_spend_attempt_at(tx_id, wallet, inputs, amount, nonce, unix_now())
    }

    pub fn check_spend_attempt_at(
        &mut self,
        tx_id: &str,
        wallet: &str,
        inputs: &[OutputRef],
        amount: f64,
        nonce: u64,
        now: Timestamp,
    ) -> SpendResult<Option<SpendAttempt>> {
        validate_request(tx_id, inputs)?;
        if wallet.is_empty() {
            return Err(SpendError::InvalidInput("wallet must not be empty".to_string()));
        }
        if !amount.is_finite() || amount < 0.0 {
            return Err(SpendError::InvalidAmount(amount));
        }

        let attempt = |attempt_type, input: Option<String>, reason: &str, is_malicious| SpendAttempt {
            tx_id: tx_id.to_string(),
            wallet: wallet.to_string(),
            attempt_type,
            timestamp: now,
            input,
            reason: reason.to_string(),
            is_malicious,
        };

        if self.blacklisted_wallets.contains(wallet) {
            // Counted, not logged: the blacklist event already covers the wallet.
            let rejected = attempt(SpendAttemptType::DoubleSpend, None, REASON_BLACKLISTED, true);
            debug!(tx_id = %tx_id, wallet = %wallet, "Spend from blacklisted wallet rejected");
            self.count_attempt(&rejected);
            return Ok(Some(rejected));
        }

        for input in inputs {
            let input_id = input.input_id();

            if self.spent_outputs.contains(&input_id) {
                let detected = attempt(
                    SpendAttemptType::DoubleSpend,
                    Some(input_id.clone()),
                    REASON_ALREADY_SPENT,
                    true,
                );
                warn!(
                    tx_id = %tx_id,
                    wallet = %wallet,
                    input = %input_id,
                    "Double spend detected"
                );
                self.record_malicious(detected.clone(), now);
                return Ok(Some(detected));
            }

            if let Some(lock) = self.pending_spends.get(&input_id) {
                if now - lock.locked_at < self.config.spend_lock_secs {
                    let conflict = attempt(
                        SpendAttemptType::DoubleSpend,
                        Some(input_id.clone()),
                        REASON_PENDING,
                        false,
                    );
                    debug!(
                        tx_id = %tx_id,
                        holder = %lock.tx_id,
                        input = %input_id,
                        "Input locked by pending spend"
                    );
                    self.record(conflict.clone());
                    return Ok(Some(conflict));
                }
            }
        }

        let nonce_key = (wallet.to_string(), nonce);
        if let Some(binding) = self.nonces.get(&nonce_key) {
            if binding.tx_id != tx_id {
                let detected = attempt(SpendAttemptType::NonceReuse, None, REASON_NONCE_REUSED, true);
                warn!(
                    tx_id = %tx_id,
                    wallet = %wallet,
                    nonce,
                    original_tx = %binding.tx_id,
                    "Nonce reuse detected"
                );
                self.record_malicious(detected.clone(), now);
                return Ok(Some(detected));
            }
        }

        for input in inputs {
            self.pending_spends.insert(
                input.input_id(),
                PendingLock {
                    tx_id: tx_id.to_string(),
                    locked_at: now,
                },
            );
        }
        self.nonces.insert(
            nonce_key.clone(),
            NonceBinding {
                tx_id: tx_id.to_string(),
                bound_at: now,
                confirmed: false,
            },
        );
        self.nonce_by_tx.insert(tx_id.to_string(), nonce_key);

        debug!(tx_id = %tx_id, wallet = %wallet, inputs = inputs.len(), "Inputs locked");
        Ok(None)
    }

    fn count_attempt(&mut self, attempt: &SpendAttempt) {
        let record = self.wallets.entry(attempt.wallet.clone()).or_default();
        record.total_attempts += 1;
        if attempt.is_malicious {
            record.malicious_attempts += 1;
        }
        record.last_attempt = record.last_attempt.max(attempt.timestamp);
    }

    fn record(&mut self, attempt: SpendAttempt) {
        self.count_attempt(&attempt);
        if self.audit_log.len() >= MAX_AUDIT_ENTRIES {
            self.audit_log.pop_front();
        }
        self.audit_log.push_back(attempt);
    }

    fn record_malicious(&mut self, attempt: SpendAttempt, now: Timestamp) {
        let wallet = attempt.wallet.clone();
        self.record(attempt);

        if self.blacklisted_wallets.contains(&wallet) {
            return;
        }

        let window = self.config.blacklist_window_secs;
        let recent = match self.wallets.get_mut(&wallet) {
            Some(record) => {
                record.strikes.push_back(now);
                record.expire_strikes(now, window);
                record.strikes.len()
            }
            None => return,
        };

        if recent >= self.config.blacklist_threshold {
            warn!(wallet = %wallet, attempts = recent, "Wallet blacklisted");
            self.blacklisted_wallets.insert(wallet.clone());
            if let Some(record) = self.wallets.get_mut(&wallet) {
                record.strikes.clear();
            }
            self.blacklist_events.push(BlacklistEvent {
                wallet,
                timestamp: now,
                attempts: recent,
            });
        }
    }

    /// Move inputs into the spent set and drop their locks.
    ///
    /// Called once the owning block is accepted; confirmation is
    /// unconditional.
    pub fn confirm_spend(&mut self, tx_id: &str, inputs: &[OutputRef]) -> SpendResult<()> {
        validate_request(tx_id, inputs)?;

        for input in inputs {
            let input_id = input.input_id();
            self.pending_spends.remove(&input_id);
            self.spent_outputs.insert(input_id);
        }
        if let Some(key) = self.nonce_by_tx.remove(tx_id) {
            if let Some(binding) = self.nonces.get_mut(&key) {
                binding.confirmed = true;
            }
        }

        info!(tx_id = %tx_id, inputs = inputs.len(), "Spend confirmed");
        Ok(())
    }

    /// Drop locks without spending, after a downstream rejection.
    ///
    /// Only locks held by `tx_id` are released.
    ///
    /// # Returns
    /// Number of locks released.
    pub fn release_pending(&mut self, tx_id: &str, inputs: &[OutputRef]) -> SpendResult<usize> {
        validate_request(tx_id, inputs)?;

        let mut released = 0;
        for input in inputs {
            let input_id = input.input_id();
            let held = self
                .pending_spends
                .get(&input_id)
                .map(|lock| lock.tx_id == tx_id)
                .unwrap_or(false);
            if held {
                self.pending_spends.remove(&input_id);
                released += 1;
            }
        }
        if let Some(key) = self.nonce_by_tx.remove(tx_id) {
            self.nonces.remove(&key);
        }

        debug!(tx_id = %tx_id, released, "Pending spend released");
        Ok(released)
    }

    pub fn cleanup_old_pending(&mut self) -> usize {
        self.cleanup_old_pending_at(unix_now())
    }

    /// Purge locks older than the lock window, with their nonce bindings.
    ///
    /// Also drops audit entries past the retention window and strikes past
    /// the blacklist window.
    pub fn cleanup_old_pending_at(&mut self, now: Timestamp) -> usize {
        let window = self.config.spend_lock_secs;
        let before = self.pending_spends.len();
        self.pending_spends
            .retain(|_, lock| now - lock.locked_at <= window);
        let purged = before - self.pending_spends.len();

        let nonce_by_tx = &mut self.nonce_by_tx;
        self.nonces.retain(|_, binding| {
            let keep = binding.confirmed || now - binding.bound_at <= window;
            if !keep {
                nonce_by_tx.remove(&binding.tx_id);
            }
            keep
        });

        let retention = self.config.audit_retention_secs;
        while let Some(oldest) = self.audit_log.front() {
            if now - oldest.timestamp <= retention {
                break;
            }
            self.audit_log.pop_front();
        }

        let strike_window = self.config.blacklist_window_secs;
        for record in self.wallets.values_mut() {
            record.expire_strikes(now, strike_window);
        }

        if purged > 0 {
            debug!(purged, remaining = self.pending_spends.len(), "Expired pending spends purged");
        }
        purged
    }

    /// Lifetime counters for `wallet`; audit trimming does not reset them.
    pub fn wallet_status(&self, wallet: &str) -> WalletStatus {
        let record = self.wallets.get(wallet);
        WalletStatus {
            is_blacklisted: self.blacklisted_wallets.contains(wallet),
            total_attempts: record.map_or(0, |r| r.total_attempts),
            malicious_attempts: record.map_or(0, |r| r.malicious_attempts),
            last_attempt: record.map_or(0.0, |r| r.last_attempt),
        }
    }

    pub fn is_blacklisted(&self, wallet: &str) -> bool {
        self.blacklisted_wallets.contains(wallet)
    }

    pub fn is_spent(&self, output: &OutputRef) -> bool {
        self.spent_outputs.contains(&output.input_id())
    }

    pub fn pending_count(&self) -> usize {
        self.pending_spends.len()
    }

    /// Retained detections and conflicts, oldest first.
    pub fn audit_log(&self) -> impl Iterator<Item = &SpendAttempt> + '_ {
        self.audit_log.iter()
    }

    pub fn audit_len(&self) -> usize {
        self.audit_log.len()
    }

    pub fn blacklist_events(&self) -> &[BlacklistEvent] {
        &self.blacklist_events
    }
}

impl Default for DoubleSpendDetector {
    fn default() -> Self {
        Self::new(DoubleSpendConfig::default())
    }
}

fn validate_request(tx_id: &str, inputs: &[OutputRef]) -> SpendResult<()> {
    if tx_id.is_empty() {
        return Err(SpendError::InvalidInput("tx id must not be empty".to_string()));
    }
    if inputs.is_empty() {
        return Err(SpendError::NoInputs(tx_id.to_string()));
    }
    if let Some(bad) = inputs.iter().find(|i| i.tx_id.is_empty()) {
        return Err(SpendError::InvalidInput(format!(
            "input {} has an empty tx id",
            bad
        )));
    }
    let mut seen = HashSet::with_capacity(inputs.len());
    if let Some(dup) = inputs.iter().find(|i| !seen.insert(i.input_id())) {
        return Err(SpendError::InvalidInput(format!(
            "input {} listed more than once",
            dup
        )));
    }
    Ok(())
}
