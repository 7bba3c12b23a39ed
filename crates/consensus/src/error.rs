//! Error types for mining and the consensus engine.

use logichain_core::CoreError;
use logichain_guard::{PodError, SpendError, TransitionError};
use logichain_identity::ChallengeError;
use logichain_trust_mesh::{ClockError, MeshError};
use thiserror::Error;

/// Block validation failures for the dual-mode miner.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MiningError {
    #[error("Block size {size} exceeds {max} bytes")]
    BlockTooLarge { size: usize, max: usize },

    #[error("Block carries {count} transactions (max {max})")]
    TooManyTransactions { count: usize, max: usize },

    #[error("Block hash does not meet difficulty {difficulty}")]
    InsufficientDifficulty { difficulty: u32 },

    #[error("Block serialization failed: {0}")]
    Serialization(String),
}

impl From<CoreError> for MiningError {
    fn from(e: CoreError) -> Self {
        MiningError::Serialization(e.to_string())
    }
}

/// Errors surfaced by [`crate::engine::ConsensusEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine state poisoned: {0}")]
    StatePoisoned(&'static str),

    #[error(transparent)]
    Spend(#[from] SpendError),

    #[error(transparent)]
    Pod(#[from] PodError),

    #[error(transparent)]
    Challenge(#[from] ChallengeError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Mining(#[from] MiningError),

    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Clock(#[from] ClockError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
