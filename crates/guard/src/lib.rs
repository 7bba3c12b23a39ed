//! Admission guards and connectivity-mode transitions for LogiChain nodes.
//!
//! - **Double-spend detection**: output locks, spent set, nonce binding and
//!   3-strikes blacklisting
//! - **POD replay protection**: dual-signed delivery proofs accepted once,
//!   Bloom pre-check backed by an exact set
//! - **Transition state machine**: signed online/offline switches with an
//!   append-only proof history
//!
//! Detections are returned as values and kept in audit logs; malformed
//! input is a typed error.

pub mod bloom;
pub mod double_spend;
pub mod error;
pub mod pod;
pub mod transition;

pub use bloom::BloomFilter;
pub use double_spend::{
    BlacklistEvent, DoubleSpendDetector, OutputRef, SpendAttempt, SpendAttemptType, WalletStatus,
};
pub use error::{
    PodError, PodResult, SpendError, SpendResult, TransitionError, TransitionResult,
};
pub use pod::{Pod, PodLocation, PodReplayGuard};
pub use transition::{
    offline_message, online_message, ConfirmationSource, NodeSignature, OfflineOperation,
    TransitionKind, TransitionManager, TransitionProof, TransitionState,
};
