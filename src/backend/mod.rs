//! Simulation backend seam.
//!
//! The orchestrator only talks to the backend through [`SimulationBackend`], so the HTTP
//! client can be swapped for a scripted backend in tests.

mod http;

pub use http::HttpBackend;

use crate::error::BackendError;
use crate::model::{ResultId, Scenario, TaskId};
use async_trait::async_trait;

#[async_trait]
pub trait SimulationBackend: Send + Sync + 'static {
    /// Submit one scenario and return the task id the backend assigned to it.
    async fn begin(&self, scenario: &Scenario) -> Result<TaskId, BackendError>;

    /// Current result id of a task; `None` while the simulation is still running.
    async fn poll(&self, task_id: &TaskId) -> Result<Option<ResultId>, BackendError>;

    /// Ask the backend to abandon a task.
    async fn terminate(&self, task_id: &TaskId) -> Result<(), BackendError>;
}
