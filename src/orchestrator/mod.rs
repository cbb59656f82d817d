//! Simulation batch orchestration.
//!
//! This module owns the start → poll → completion lifecycle of one batch of renovation
//! scenarios and the stop path that terminates in-flight tasks on the backend. UI/CLI layers
//! only call `start`/`stop` and observe progress through the injected status surface.

mod controller;
mod poller;
#[cfg(test)]
pub(crate) mod testing;

pub use controller::{Orchestrator, OrchestratorConfig};
