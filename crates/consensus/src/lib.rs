//! LogiChain consensus.
//!
//! Ties the admission guards, trust scoring and identity checks together
//! behind a single [`ConsensusEngine`] per node:
//!
//! - [`fork::ForkResolver`] picks between online and offline chains
//! - [`mining::DualMiningController`] mines and validates blocks per
//!   connectivity mode
//! - [`maintenance::MaintenanceScheduler`] purges expired state on timers

pub mod engine;
pub mod error;
pub mod fork;
pub mod maintenance;
pub mod mining;

pub use engine::{AuditReport, ConsensusEngine};
pub use error::{EngineError, EngineResult, MiningError};
pub use fork::{ChainMetrics, ChainSide, ForkMetrics, ForkReason, ForkResolution, ForkResolver, SuspiciousFork};
pub use maintenance::{run_all_at, MaintenanceScheduler, MaintenanceStats};
pub use mining::{DualMiningController, MinedBlock, MiningResult, POWER_PER_WORKER};
