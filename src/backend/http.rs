use super::SimulationBackend;
use crate::error::BackendError;
use crate::model::{ResultId, RunConfig, Scenario, TaskId};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

const SIMULATE_PATH: &str = "/oemof/simulate";
const TERMINATE_PATH: &str = "/oemof/terminate";

#[derive(Debug, Deserialize)]
struct BeginResponse {
    task_id: TaskId,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    simulation_id: Option<ResultId>,
}

/// `reqwest`-based client for the oemof simulation endpoints.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    simulation_scenario: String,
}

impl HttpBackend {
    pub fn new(cfg: &RunConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        // Simulations are tied to the advisory session of the household.
        if let Some(session_id) = cfg.session_id.as_deref() {
            let cookie = HeaderValue::from_str(&format!("sessionid={session_id}"))
                .context("session id is not a valid header value")?;
            headers.insert(COOKIE, cookie);
        }

        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .default_headers(headers)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            simulation_scenario: cfg.simulation_scenario.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        operation: &'static str,
        req: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, BackendError> {
        let resp = req
            .send()
            .await
            .map_err(|source| BackendError::Transport { operation, source })?;
        // Only a plain 200 counts as success.
        if resp.status() != StatusCode::OK {
            return Err(BackendError::Status {
                operation,
                status: resp.status(),
            });
        }
        Ok(resp)
    }

    async fn decode<T: DeserializeOwned>(
        operation: &'static str,
        resp: reqwest::Response,
    ) -> Result<T, BackendError> {
        let body = resp
            .bytes()
            .await
            .map_err(|source| BackendError::Transport { operation, source })?;
        serde_json::from_slice(&body).map_err(|e| BackendError::Decode {
            operation,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl SimulationBackend for HttpBackend {
    async fn begin(&self, scenario: &Scenario) -> Result<TaskId, BackendError> {
        const OP: &str = "begin simulation";
        let parameters = scenario.parameters().to_string();
        let form = [
            ("scenario", self.simulation_scenario.as_str()),
            ("parameters", parameters.as_str()),
        ];
        let req = self.http.post(self.url(SIMULATE_PATH)).form(&form);
        let resp = self.send(OP, req).await?;
        let body: BeginResponse = Self::decode(OP, resp).await?;
        Ok(body.task_id)
    }

    async fn poll(&self, task_id: &TaskId) -> Result<Option<ResultId>, BackendError> {
        const OP: &str = "poll status";
        let req = self
            .http
            .get(self.url(SIMULATE_PATH))
            .query(&[("task_id", task_id.0.as_str())]);
        let resp = self.send(OP, req).await?;
        let body: PollResponse = Self::decode(OP, resp).await?;
        Ok(body.simulation_id)
    }

    async fn terminate(&self, task_id: &TaskId) -> Result<(), BackendError> {
        const OP: &str = "terminate";
        let req = self
            .http
            .post(self.url(TERMINATE_PATH))
            .form(&[("task_id", task_id.0.as_str())]);
        // Body is not consulted.
        self.send(OP, req).await?;
        Ok(())
    }
}
