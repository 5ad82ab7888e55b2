use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::AgentCallError;
use crate::types::{ActRequest, ActResponse};

/// Path appended to a white agent's base URL for action requests.
/// Overridable for agents that mount their decision endpoint elsewhere.
const ACT_PATH_ENV: &str = "WHITE_AGENT_ACT_PATH";

/// Boundary to the remote decision-maker. One call per step; the harness
/// never looks inside the agent's reasoning.
#[async_trait]
pub trait AgentConnector: Send + Sync {
    async fn act(&self, request: &ActRequest) -> Result<ActResponse, AgentCallError>;
}

/// HTTP client for a remote white agent speaking the `/act` protocol.
pub struct WhiteAgentClient {
    http: reqwest::Client,
    base_url: String,
    act_path: String,
    timeout: Duration,
}

impl WhiteAgentClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            act_path: std::env::var(ACT_PATH_ENV).unwrap_or_else(|_| "/act".to_string()),
            timeout,
        }
    }

    fn act_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.act_path)
    }
}

#[async_trait]
impl AgentConnector for WhiteAgentClient {
    async fn act(&self, request: &ActRequest) -> Result<ActResponse, AgentCallError> {
        let url = self.act_url();
        debug!(step = request.step_idx, %url, "calling white agent");

        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentCallError::Timeout(self.timeout)
                } else {
                    AgentCallError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentCallError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AgentCallError::Transport(format!("invalid JSON body: {e}")))?;

        let action = body
            .get("action")
            .cloned()
            .ok_or(AgentCallError::MissingAction)?;

        Ok(ActResponse {
            action,
            thoughts: body
                .get("thoughts")
                .and_then(Value::as_str)
                .map(String::from),
            info: body.get("info").cloned(),
        })
    }
}
