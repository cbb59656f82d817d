//! Batch lifecycle controller.
//!
//! Owns start/stop orchestration and the single active batch. `start`, `stop` and every poll
//! cycle run under the same async mutex, so they never interleave.

use super::poller;
use crate::backend::SimulationBackend;
use crate::error::{OrchestratorError, Result};
use crate::model::{
    Batch, DispatchFailurePolicy, OrchestratorState, Progress, RunConfig, Scenario, Task,
};
use crate::status::{ResultsRenderer, StatusSurface, IDLE_LABEL, STARTED_LABEL};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub scenarios: Vec<Scenario>,
    pub poll_interval: Duration,
    /// `None` polls until the batch completes or is stopped.
    pub max_poll_cycles: Option<u32>,
    pub dispatch_failure_policy: DispatchFailurePolicy,
}

impl From<&RunConfig> for OrchestratorConfig {
    fn from(cfg: &RunConfig) -> Self {
        Self {
            scenarios: cfg.scenarios.clone(),
            poll_interval: cfg.poll_interval,
            max_poll_cycles: cfg.max_poll_cycles,
            dispatch_failure_policy: cfg.dispatch_failure_policy,
        }
    }
}

/// Handle for the spawned poll loop of the active batch.
pub(super) struct Poller {
    cancel: CancellationToken,
    handle: JoinHandle<Result<()>>,
}

impl Poller {
    /// Stop the loop; a cycle waiting on the lock or sleeping will never run.
    fn cancel(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

pub(super) struct Inner {
    pub state: OrchestratorState,
    pub batch: Option<Batch>,
    pub poller: Option<Poller>,
    pub poll_cycles: u32,
}

pub(super) struct Shared<B, S, R> {
    pub backend: B,
    pub status: S,
    pub renderer: R,
    pub cfg: OrchestratorConfig,
    pub inner: Mutex<Inner>,
}

/// Drives zero or one simulation batch at a time.
///
/// Dropping the last handle cancels polling but does not terminate tasks on the backend;
/// call [`Orchestrator::stop`] first for that.
pub struct Orchestrator<B, S, R> {
    shared: Arc<Shared<B, S, R>>,
}

impl<B, S, R> Clone for Orchestrator<B, S, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B, S, R> Orchestrator<B, S, R>
where
    B: SimulationBackend,
    S: StatusSurface,
    R: ResultsRenderer,
{
    pub fn new(backend: B, status: S, renderer: R, cfg: OrchestratorConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                status,
                renderer,
                cfg,
                inner: Mutex::new(Inner {
                    state: OrchestratorState::Idle,
                    batch: None,
                    poller: None,
                    poll_cycles: 0,
                }),
            }),
        }
    }

    /// Stop any active batch, then dispatch every configured scenario and begin polling.
    pub async fn start(&self) -> Result<()> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;

        // At most one batch: the previous one is fully retired before dispatching anew.
        if inner.state.has_batch() {
            info!("stopping active batch before starting a new one");
            shared.stop_locked(&mut inner).await?;
        }

        inner.state = OrchestratorState::Starting;
        inner.poll_cycles = 0;
        shared.status.set_control(STARTED_LABEL, false);
        shared.status.set_panel_visible(true);

        let mut batch = Batch::default();
        for scenario in &shared.cfg.scenarios {
            match shared.backend.begin(scenario).await {
                Ok(task_id) => {
                    debug!(%scenario, %task_id, "simulation dispatched");
                    batch.tasks.push(Task::pending(task_id, scenario.clone()));
                }
                Err(source) => {
                    error!(%scenario, error = %source, "simulation not started");
                    shared.abandon_dispatch(&mut inner, batch).await;
                    return Err(OrchestratorError::Dispatch {
                        scenario: scenario.clone(),
                        source,
                    });
                }
            }
        }

        let task_ids: Vec<String> = batch.tasks.iter().map(|t| t.task_id.0.clone()).collect();
        info!(?task_ids, "simulation started");

        inner.batch = Some(batch);
        inner.state = OrchestratorState::Running;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poller::run(
            Arc::downgrade(shared),
            shared.cfg.poll_interval,
            cancel.clone(),
        ));
        inner.poller = Some(Poller { cancel, handle });
        Ok(())
    }

    /// Terminate every task of the active batch on the backend and cancel polling.
    ///
    /// A no-op when no batch is active.
    pub async fn stop(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        self.shared.stop_locked(&mut inner).await
    }

    pub async fn state(&self) -> OrchestratorState {
        self.shared.inner.lock().await.state
    }

    pub async fn progress(&self) -> Option<Progress> {
        self.shared
            .inner
            .lock()
            .await
            .batch
            .as_ref()
            .map(Batch::progress)
    }

    /// Snapshot of the active batch.
    pub async fn batch(&self) -> Option<Batch> {
        self.shared.inner.lock().await.batch.clone()
    }

    /// Poll cycles run for the current (or most recently finished) batch.
    pub async fn poll_cycles(&self) -> u32 {
        self.shared.inner.lock().await.poll_cycles
    }
}

impl<B, S, R> Drop for Shared<B, S, R> {
    fn drop(&mut self) {
        if let Some(poller) = self.inner.get_mut().poller.take() {
            poller.cancel();
        }
    }
}

impl<B, S, R> Shared<B, S, R>
where
    B: SimulationBackend,
    S: StatusSurface,
    R: ResultsRenderer,
{
    pub(super) async fn stop_locked(&self, inner: &mut Inner) -> Result<()> {
        if let Some(poller) = inner.poller.take() {
            poller.cancel();
        }
        let Some(mut batch) = inner.batch.take() else {
            return Ok(());
        };

        inner.state = OrchestratorState::Stopping;
        while let Some(task) = batch.tasks.pop() {
            match self.backend.terminate(&task.task_id).await {
                Ok(()) => info!(task_id = %task.task_id, "simulation stopped"),
                Err(source) => {
                    error!(task_id = %task.task_id, error = %source, "error terminating simulation");
                    let task_id = task.task_id.clone();
                    // Keep the undrained remainder so a later stop can resume the drain.
                    batch.tasks.push(task);
                    inner.batch = Some(batch);
                    inner.state = OrchestratorState::Stalled;
                    self.status.set_control(IDLE_LABEL, true);
                    return Err(OrchestratorError::Terminate { task_id, source });
                }
            }
        }

        inner.state = OrchestratorState::Idle;
        self.status.set_control(IDLE_LABEL, true);
        Ok(())
    }

    /// Settle the already dispatched prefix of a failed `start` according to policy.
    async fn abandon_dispatch(&self, inner: &mut Inner, mut prefix: Batch) {
        if self.cfg.dispatch_failure_policy == DispatchFailurePolicy::Rollback {
            let mut survivors = Vec::new();
            while let Some(task) = prefix.tasks.pop() {
                match self.backend.terminate(&task.task_id).await {
                    Ok(()) => debug!(task_id = %task.task_id, "rolled back dispatched simulation"),
                    Err(e) => {
                        warn!(task_id = %task.task_id, error = %e, "rollback could not terminate simulation");
                        survivors.push(task);
                    }
                }
            }
            survivors.reverse();
            prefix.tasks = survivors;
        }

        self.status.set_control(IDLE_LABEL, true);
        if prefix.is_empty() {
            inner.state = OrchestratorState::Idle;
            inner.batch = None;
        } else {
            // Still running server-side; the next stop or start terminates them.
            self.status.notify(&format!(
                "{} dispatched simulation(s) left running",
                prefix.len()
            ));
            inner.state = OrchestratorState::Stalled;
            inner.batch = Some(prefix);
        }
    }
}
