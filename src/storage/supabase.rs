use super::{ObjectStorage, RetrievedObject, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Response, StatusCode};
use tracing::{debug, instrument};

/// Supabase Storage over its REST API, authenticated with the service-role key
#[derive(Clone)]
pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    service_key: String,
}

impl SupabaseStorage {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        bucket: impl Into<String>,
        service_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            service_key: service_key.into(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key)
    }

    async fn into_object(response: Response, key: &str) -> Result<RetrievedObject, StorageError> {
        match response.status() {
            status if status.is_success() => {
                let content_type = response
                    .headers()
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| StorageError::Provider(e.to_string()))?;
                Ok(RetrievedObject {
                    bytes,
                    content_type,
                })
            }
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(key.to_string())),
            status => Err(StorageError::Provider(provider_message(status, response).await)),
        }
    }
}

/// Supabase reports failures as `{"statusCode": "...", "error": "...", "message": "..."}`
async fn provider_message(status: StatusCode, response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or(body);
    format!("{} {}", status.as_u16(), message)
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    #[instrument(skip(self, bytes), fields(bucket = %self.bucket, size = bytes.len()))]
    async fn upload(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), StorageError> {
        let response = self
            .client
            .post(self.object_url(key))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::Provider(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(key, "object uploaded");
            Ok(())
        } else {
            Err(StorageError::Provider(provider_message(status, response).await))
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, key
        )
    }

    #[instrument(skip(self))]
    async fn fetch_public(&self, url: &str) -> Result<RetrievedObject, StorageError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StorageError::Provider(e.to_string()))?;
        Self::into_object(response, url).await
    }

    #[instrument(skip(self))]
    async fn download(&self, key: &str) -> Result<RetrievedObject, StorageError> {
        let response = self
            .client
            .get(self.object_url(key))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .send()
            .await
            .map_err(|e| StorageError::Provider(e.to_string()))?;
        Self::into_object(response, key).await
    }
}
