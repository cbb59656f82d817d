use crate::model::{Scenario, TaskId};
use thiserror::Error;

/// Failure of a single round-trip to the simulation backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{operation} returned status {status}")]
    Status {
        operation: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("{operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} response could not be decoded: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },
}

/// Hard failures of the orchestrator, one variant per backend operation that can fail.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("simulation not started for scenario '{scenario}': {source}")]
    Dispatch {
        scenario: Scenario,
        #[source]
        source: BackendError,
    },

    #[error("simulation for task ID '{task_id}' could not be polled: {source}")]
    Poll {
        task_id: TaskId,
        #[source]
        source: BackendError,
    },

    #[error("error terminating simulation with task ID '{task_id}': {source}")]
    Terminate {
        task_id: TaskId,
        #[source]
        source: BackendError,
    },

    #[error("batch still incomplete after {cycles} poll cycles")]
    PollLimitExceeded { cycles: u32 },
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
