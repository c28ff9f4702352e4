//! HTTP client for the bill API, used by the terminal dashboard.

use crate::{
    entities::{BillStatus, TransactionType},
    handlers::bills::{DeletedBill, UploadBillResponse},
    models::{BillStats, BillView},
    ApiResponse,
};
use bytes::Bytes;
use reqwest::{header, multipart, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{message} (HTTP {status})")]
    Api { status: StatusCode, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

/// A file fetched through the download endpoint
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(http: reqwest::Client, base_url: &str, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn list_bills(
        &self,
        limit: Option<u64>,
        include_items: bool,
    ) -> Result<Vec<BillView>, ClientError> {
        let mut query: Vec<(&str, String)> = vec![("include_items", include_items.to_string())];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        let response = self
            .http
            .get(self.url("/api/bills"))
            .bearer_auth(&self.token)
            .query(&query)
            .send()
            .await?;
        envelope(response).await
    }

    pub async fn get_bill(&self, bill_id: Uuid) -> Result<BillView, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/api/bills/{bill_id}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        envelope(response).await
    }

    pub async fn stats(&self, user_id: &str, period_days: u32) -> Result<BillStats, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/api/bills/stats/{user_id}")))
            .bearer_auth(&self.token)
            .query(&[("period", period_days)])
            .send()
            .await?;
        decode(checked(response).await?).await
    }

    pub async fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
        bill_type: TransactionType,
    ) -> Result<UploadBillResponse, ClientError> {
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("billType", bill_type.to_string());

        let response = self
            .http
            .post(self.url("/api/bills/upload"))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;
        decode(checked(response).await?).await
    }

    pub async fn download(&self, bill_id: Uuid) -> Result<DownloadedFile, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/api/bills/{bill_id}/download")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let response = checked(response).await?;

        let headers = response.headers();
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let filename = headers
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(attachment_filename)
            .unwrap_or_else(|| format!("{bill_id}.bin"));

        Ok(DownloadedFile {
            filename,
            content_type,
            bytes: response.bytes().await?,
        })
    }

    pub async fn delete(&self, bill_id: Uuid) -> Result<DeletedBill, ClientError> {
        let response = self
            .http
            .delete(self.url(&format!("/api/bills/{bill_id}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        envelope(response).await
    }

    pub async fn update_status(
        &self,
        bill_id: Uuid,
        status: BillStatus,
    ) -> Result<BillView, ClientError> {
        let response = self
            .http
            .patch(self.url(&format!("/api/bills/{bill_id}/status")))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "status": status.to_string() }))
            .send()
            .await?;
        envelope(response).await
    }
}

/// Turns non-2xx answers into `ClientError::Api` with the server's message
async fn checked(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), body = %body, "API call failed");
    Err(ClientError::Api {
        status,
        message: error_message(&body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

async fn envelope<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let wrapped: ApiResponse<T> = decode(checked(response).await?).await?;
    wrapped
        .data
        .ok_or_else(|| ClientError::Decode("response carried no data".into()))
}

/// Understands both `{message}` error bodies and the auth layer's `{error: {message}}`
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| value.pointer("/error/message").and_then(Value::as_str))
        .map(str::to_string)
}

fn attachment_filename(disposition: &str) -> Option<String> {
    disposition.split(';').find_map(|part| {
        part.trim()
            .strip_prefix("filename=")
            .map(|name| name.trim_matches('"').to_string())
            .filter(|name| !name.is_empty())
    })
}
