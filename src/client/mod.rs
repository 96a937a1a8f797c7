//! HTTP client for a running gateflow server.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::api::ErrorResponse;
use crate::api::handlers::{ResumeRequest, RunList, StartAsyncResponse, StartRequest};
use crate::engine::{RunStatus, RunView};
use crate::engine::types::Payload;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server rejected the request with a structured error.
    #[error("server returned {status} ({kind}): {message}")]
    Api {
        status: u16,
        kind: String,
        message: String,
        details: Vec<String>,
    },

    #[error("run still running after {attempts} status checks")]
    PollTimeout { attempts: u32 },
}

/// Bounded polling schedule for [`GateflowClient::wait`].
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(3000),
            max_attempts: 60,
        }
    }
}

pub struct GateflowClient {
    http: reqwest::Client,
    base_url: String,
}

impl GateflowClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn start(&self, workflow_id: &str, input: Payload) -> Result<RunView, ClientError> {
        let body = StartRequest { input_data: input };
        self.post(&format!("/workflows/{}/start", workflow_id), &body).await
    }

    pub async fn start_async(
        &self,
        workflow_id: &str,
        input: Payload,
    ) -> Result<StartAsyncResponse, ClientError> {
        let body = StartRequest { input_data: input };
        self.post(&format!("/workflows/{}/start-async", workflow_id), &body)
            .await
    }

    pub async fn resume(
        &self,
        run_id: &str,
        step_id: &str,
        resume_data: Payload,
    ) -> Result<RunView, ClientError> {
        let body = ResumeRequest {
            step_id: step_id.to_string(),
            resume_data,
        };
        self.post(&format!("/runs/{}/resume", run_id), &body).await
    }

    pub async fn status(&self, run_id: &str) -> Result<RunView, ClientError> {
        let response = self.http.get(self.url(&format!("/runs/{}", run_id))).send().await?;
        decode(response).await
    }

    pub async fn list(&self, status: Option<RunStatus>) -> Result<RunList, ClientError> {
        let mut request = self.http.get(self.url("/runs"));
        if let Some(status) = status {
            request = request.query(&[("status", status.to_string())]);
        }
        decode(request.send().await?).await
    }

    /// Poll until the run leaves `running`.
    ///
    /// A failed run is returned as a view like any other; only exhausting
    /// the attempt budget is an error. Transport errors count as attempts.
    pub async fn wait(&self, run_id: &str, poll: PollConfig) -> Result<RunView, ClientError> {
        for attempt in 1..=poll.max_attempts {
            match self.status(run_id).await {
                Ok(view) if view.status != RunStatus::Running => return Ok(view),
                Ok(_) => debug!(run_id = %run_id, attempt, "Run still running"),
                Err(ClientError::Transport(e)) => {
                    warn!(run_id = %run_id, attempt, error = %e, "Status check failed")
                }
                Err(e) => return Err(e),
            }
            if attempt < poll.max_attempts {
                tokio::time::sleep(poll.interval).await;
            }
        }

        Err(ClientError::PollTimeout {
            attempts: poll.max_attempts,
        })
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let text = response.text().await?;
    let (kind, message, details) = match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(err) => (err.kind, err.error, err.details),
        Err(_) => ("Unknown".to_string(), text, Vec::new()),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        kind,
        message,
        details,
    })
}
