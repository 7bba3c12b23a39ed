//! Cross-crate scenario tests for LogiChain consensus
//!
//! This test suite validates, end to end through `ConsensusEngine`:
//! - Double-spend detection and 3-strikes blacklisting
//! - POD replay protection
//! - Fork resolution and suspicious-fork auditing
//! - Single-use identity challenges
//! - Online/offline transitions with mesh blocks and offline mining
//! - Background maintenance

pub mod test_utils;

#[cfg(test)]
mod spend_scenarios;

#[cfg(test)]
mod pod_scenarios;

#[cfg(test)]
mod fork_scenarios;

#[cfg(test)]
mod identity_scenarios;

#[cfg(test)]
mod transition_scenarios;

#[cfg(test)]
mod maintenance_scenarios;
