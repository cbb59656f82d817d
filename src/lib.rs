//! Client-side driver for renovation-scenario simulation batches.
//!
//! A batch dispatches one simulation per renovation scenario to the oemof backend, polls
//! until every scenario has a result and hands the ordered result ids to a renderer.

pub mod backend;
pub mod cli;
pub mod error;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod status;
mod text_summary;
