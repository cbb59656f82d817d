//! Scripted in-memory backend shared by the orchestrator and CLI tests.

use super::{Orchestrator, OrchestratorConfig};
use crate::backend::SimulationBackend;
use crate::error::BackendError;
use crate::model::{
    DispatchFailurePolicy, OrchestratorEvent, ResultId, Scenario, TaskId, DEFAULT_POLL_INTERVAL,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Begin(String),
    Poll(String),
    Terminate(String),
}

#[derive(Default)]
pub(crate) struct Script {
    pub calls: Vec<Call>,
    pub next_id: u32,
    /// Polls a scenario needs before it reports a result; one when absent.
    pub polls_to_finish: HashMap<String, u32>,
    pub begin_delay: HashMap<String, Duration>,
    /// Applied to every status query, so a cycle can be caught in flight.
    pub poll_delay: Option<Duration>,
    /// task id -> (scenario, polls seen)
    pub tasks: HashMap<String, (String, u32)>,
    pub fail_begin: HashSet<String>,
    pub fail_poll: bool,
    pub fail_terminate: HashSet<String>,
    pub never_finish: bool,
}

#[derive(Clone, Default)]
pub(crate) struct ScriptedBackend(Arc<Mutex<Script>>);

impl ScriptedBackend {
    pub(crate) fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.0.lock().unwrap()
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.script().calls.clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.script().calls.iter().filter(|c| pred(c)).count()
    }
}

fn status_error(operation: &'static str) -> BackendError {
    BackendError::Status {
        operation,
        status: StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[async_trait]
impl SimulationBackend for ScriptedBackend {
    async fn begin(&self, scenario: &Scenario) -> Result<TaskId, BackendError> {
        let delay = self.script().begin_delay.get(scenario.label()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut s = self.script();
        s.calls.push(Call::Begin(scenario.label().to_string()));
        if s.fail_begin.contains(scenario.label()) {
            return Err(status_error("begin simulation"));
        }
        s.next_id += 1;
        let id = format!("task-{}", s.next_id);
        s.tasks
            .insert(id.clone(), (scenario.label().to_string(), 0));
        Ok(TaskId(id))
    }

    async fn poll(&self, task_id: &TaskId) -> Result<Option<ResultId>, BackendError> {
        let delay = self.script().poll_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut s = self.script();
        s.calls.push(Call::Poll(task_id.0.clone()));
        if s.fail_poll {
            return Err(status_error("poll status"));
        }
        let never_finish = s.never_finish;
        let (scenario, seen) = s.tasks.get(&task_id.0).cloned().expect("unknown task");
        let needed = s.polls_to_finish.get(&scenario).copied().unwrap_or(1);
        let seen = seen + 1;
        s.tasks.insert(task_id.0.clone(), (scenario.clone(), seen));
        if never_finish || seen < needed {
            Ok(None)
        } else {
            Ok(Some(ResultId(format!("sim-{scenario}"))))
        }
    }

    async fn terminate(&self, task_id: &TaskId) -> Result<(), BackendError> {
        let mut s = self.script();
        s.calls.push(Call::Terminate(task_id.0.clone()));
        if s.fail_terminate.contains(&task_id.0) {
            return Err(status_error("terminate"));
        }
        Ok(())
    }
}

pub(crate) type TestOrchestrator = Orchestrator<
    ScriptedBackend,
    UnboundedSender<OrchestratorEvent>,
    UnboundedSender<OrchestratorEvent>,
>;

pub(crate) fn config(scenarios: &[&str]) -> OrchestratorConfig {
    OrchestratorConfig {
        scenarios: scenarios.iter().map(|s| Scenario::new(*s)).collect(),
        poll_interval: DEFAULT_POLL_INTERVAL,
        max_poll_cycles: None,
        dispatch_failure_policy: DispatchFailurePolicy::Rollback,
    }
}

pub(crate) fn orchestrator(
    backend: &ScriptedBackend,
    cfg: OrchestratorConfig,
) -> (TestOrchestrator, UnboundedReceiver<OrchestratorEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Orchestrator::new(backend.clone(), tx.clone(), tx, cfg),
        rx,
    )
}
