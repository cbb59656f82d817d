use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;

/// Default pause between two poll cycles of a running batch.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Scenario tag the backend dispatches renovation scenarios under.
pub const DEFAULT_SIMULATION_SCENARIO: &str = "oeprom";

/// The advisory flow allows at most three renovation scenarios per household.
pub const DEFAULT_SCENARIOS: [&str; 3] = ["scenario1", "scenario2", "scenario3"];

/// One renovation scenario label, submitted to the backend as a unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scenario(pub String);

impl Scenario {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn label(&self) -> &str {
        &self.0
    }

    /// JSON object carried in the `parameters` form field of a begin request.
    pub fn parameters(&self) -> serde_json::Value {
        serde_json::json!({ "renovation_scenario": self.0 })
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend ids arrive either as JSON strings or numbers; keep the string form.
fn opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Uint(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Uint(n) => n.to_string(),
    })
}

/// Handle of one in-flight backend computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        opaque_id(deserializer).map(TaskId)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a finished simulation, consumed by the results renderer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ResultId(pub String);

impl<'de> Deserialize<'de> for ResultId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        opaque_id(deserializer).map(ResultId)
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Complete(ResultId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub scenario: Scenario,
    pub status: TaskStatus,
}

impl Task {
    pub fn pending(task_id: TaskId, scenario: Scenario) -> Self {
        Self {
            task_id,
            scenario,
            status: TaskStatus::Pending,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, TaskStatus::Complete(_))
    }

    pub fn result_id(&self) -> Option<&ResultId> {
        match &self.status {
            TaskStatus::Complete(id) => Some(id),
            TaskStatus::Pending => None,
        }
    }
}

/// Tasks created by one `start()`, in scenario order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub tasks: Vec<Task>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            completed: self.tasks.iter().filter(|t| t.is_complete()).count(),
            total: self.tasks.len(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(Task::is_complete)
    }

    /// Result ids in scenario order, only once every task has completed.
    pub fn result_ids(&self) -> Option<Vec<ResultId>> {
        self.tasks
            .iter()
            .map(|t| t.result_id().cloned())
            .collect::<Option<Vec<_>>>()
    }

    pub fn scenarios(&self) -> Vec<Scenario> {
        self.tasks.iter().map(|t| t.scenario.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} simulations completed.",
            self.completed, self.total
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrchestratorState {
    Idle,
    Starting,
    Running,
    Completing,
    Stopping,
    /// A batch is still owned but nothing drives it: its poll loop aborted or its drain failed.
    Stalled,
}

impl OrchestratorState {
    pub fn has_batch(self) -> bool {
        !matches!(self, OrchestratorState::Idle)
    }
}

/// What to do with already dispatched tasks when a later dispatch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DispatchFailurePolicy {
    /// Leave the dispatched prefix running on the backend.
    Abort,
    /// Terminate the dispatched prefix (best-effort) before failing.
    #[default]
    Rollback,
}

/// Observable side effects of the orchestrator, consumed by presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrchestratorEvent {
    ControlChanged { label: String, enabled: bool },
    PanelVisibility(bool),
    Progress(Progress),
    ResultsReady(Vec<ResultId>),
    PollFailed(String),
    Message(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub base_url: String,
    pub simulation_scenario: String,
    pub scenarios: Vec<Scenario>,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default)]
    pub max_poll_cycles: Option<u32>,
    #[serde(default)]
    pub dispatch_failure_policy: DispatchFailurePolicy,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(default)]
    pub session_id: Option<String>,
    pub user_agent: String,
}

/// Summary of a finished batch for text/JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    #[serde(default)]
    pub timestamp_utc: String,
    pub base_url: String,
    pub scenarios: Vec<Scenario>,
    pub result_ids: Vec<ResultId>,
    pub poll_cycles: u32,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, scenario: &str, result: Option<&str>) -> Task {
        Task {
            task_id: TaskId(id.into()),
            scenario: Scenario::new(scenario),
            status: match result {
                Some(r) => TaskStatus::Complete(ResultId(r.into())),
                None => TaskStatus::Pending,
            },
        }
    }

    #[test]
    fn ids_decode_from_strings_and_numbers() {
        let from_str: TaskId = serde_json::from_str("\"abc-1\"").unwrap();
        let from_num: TaskId = serde_json::from_str("42").unwrap();
        assert_eq!(from_str, TaskId("abc-1".into()));
        assert_eq!(from_num, TaskId("42".into()));

        let result: Option<ResultId> = serde_json::from_str("null").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn batch_result_ids_require_full_completion() {
        let mut batch = Batch {
            tasks: vec![
                task("1", "scenario1", Some("r1")),
                task("2", "scenario2", None),
            ],
        };
        assert_eq!(batch.progress(), Progress { completed: 1, total: 2 });
        assert!(batch.result_ids().is_none());

        batch.tasks[1].status = TaskStatus::Complete(ResultId("r2".into()));
        assert!(batch.is_complete());
        assert_eq!(
            batch.result_ids().unwrap(),
            vec![ResultId("r1".into()), ResultId("r2".into())]
        );
    }

    #[test]
    fn progress_renders_completed_over_total() {
        let p = Progress { completed: 0, total: 3 };
        assert_eq!(p.to_string(), "0 / 3 simulations completed.");
    }

    #[test]
    fn scenario_parameters_carry_the_label() {
        let s = Scenario::new("scenario2");
        assert_eq!(
            s.parameters().to_string(),
            r#"{"renovation_scenario":"scenario2"}"#
        );
    }
}
