//! Client for the n8n extraction workflow.
//!
//! The workflow receives a public file URL plus a short-lived hand-off token and
//! answers with the fields it read off the invoice. Exactly one attempt is made
//! per upload.

use crate::errors::ServiceError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Body posted to the extraction webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRequest {
    pub file_url: String,
    /// Storage object key, not the client's upload name
    pub file_name: String,
    pub file_type: String,
    pub user_id: String,
    pub user_email: String,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("extraction workflow timed out after {0:?}")]
    Timeout(Duration),

    #[error("extraction workflow returned {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("extraction workflow unreachable: {0}")]
    Transport(String),

    #[error("extraction workflow returned malformed JSON: {0}")]
    InvalidBody(String),
}

impl From<WorkflowError> for ServiceError {
    fn from(err: WorkflowError) -> Self {
        ServiceError::ExtractionError(err.to_string())
    }
}

#[async_trait]
pub trait ExtractionWorkflow: Send + Sync {
    /// Runs extraction for one stored file and returns the raw JSON answer.
    async fn extract(
        &self,
        request: &ExtractionRequest,
        handoff_token: &str,
    ) -> Result<Value, WorkflowError>;
}

/// Webhook-backed workflow
#[derive(Clone)]
pub struct N8nWorkflowClient {
    client: reqwest::Client,
    webhook_url: String,
    timeout: Duration,
}

impl N8nWorkflowClient {
    pub fn new(client: reqwest::Client, webhook_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            webhook_url: webhook_url.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl ExtractionWorkflow for N8nWorkflowClient {
    #[instrument(skip(self, handoff_token), fields(file_name = %request.file_name))]
    async fn extract(
        &self,
        request: &ExtractionRequest,
        handoff_token: &str,
    ) -> Result<Value, WorkflowError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .bearer_auth(handoff_token)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkflowError::Rejected {
                status,
                body: truncate(&body, 512),
            });
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        debug!(bytes = body.len(), "extraction workflow answered");
        serde_json::from_slice(&body).map_err(|e| WorkflowError::InvalidBody(e.to_string()))
    }
}

impl N8nWorkflowClient {
    fn classify(&self, err: reqwest::Error) -> WorkflowError {
        if err.is_timeout() {
            WorkflowError::Timeout(self.timeout)
        } else {
            WorkflowError::Transport(err.to_string())
        }
    }
}

fn truncate(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
