//! Object storage for uploaded bill files.
//!
//! [`StorageGateway`] enforces the upload policy and key layout on top of an
//! [`ObjectStorage`] backend (Supabase Storage in production, in-memory for
//! local development and tests).

pub mod memory;
pub mod supabase;

use crate::errors::ServiceError;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub use memory::InMemoryStorage;
pub use supabase::SupabaseStorage;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("No file uploaded")]
    EmptyPayload,

    #[error("Unsupported file type {0}; only images and PDF files are accepted")]
    UnsupportedContentType(String),

    #[error("File is {size} bytes, larger than the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("Stored object not found: {0}")]
    NotFound(String),

    #[error("Storage provider error: {0}")]
    Provider(String),
}

impl StorageError {
    /// Rejections caused by the uploaded file itself
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyPayload | Self::UnsupportedContentType(_) | Self::TooLarge { .. }
        )
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        if err.is_client_error() {
            ServiceError::BadRequest(err.to_string())
        } else {
            ServiceError::StorageError(err.to_string())
        }
    }
}

/// A file received from a client
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub public_url: String,
}

#[derive(Debug, Clone)]
pub struct RetrievedObject {
    pub bytes: Bytes,
    /// Content type reported by the provider, if any
    pub content_type: Option<String>,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Writes a new object; never overwrites an existing key.
    async fn upload(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), StorageError>;

    /// URL under which the object is served without credentials
    fn public_url(&self, key: &str) -> String;

    /// Unauthenticated fetch of a public URL
    async fn fetch_public(&self, url: &str) -> Result<RetrievedObject, StorageError>;

    /// Authenticated, provider-native download by key
    async fn download(&self, key: &str) -> Result<RetrievedObject, StorageError>;
}

/// Upload policy, key layout and retrieval strategy over a storage backend
#[derive(Clone)]
pub struct StorageGateway {
    backend: Arc<dyn ObjectStorage>,
    max_bytes: usize,
}

impl StorageGateway {
    pub fn new(backend: Arc<dyn ObjectStorage>, max_bytes: usize) -> Self {
        Self { backend, max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Rejects uploads that are empty, too large, or neither an image nor a PDF.
    pub fn check(&self, upload: &FileUpload) -> Result<(), StorageError> {
        if upload.bytes.is_empty() {
            return Err(StorageError::EmptyPayload);
        }
        if !is_accepted_content_type(&upload.content_type) {
            return Err(StorageError::UnsupportedContentType(
                upload.content_type.clone(),
            ));
        }
        if upload.bytes.len() > self.max_bytes {
            return Err(StorageError::TooLarge {
                size: upload.bytes.len(),
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Stores the upload under `{owner}/{millis}_{nonce}_{name}`. Single attempt.
    #[instrument(skip(self, upload), fields(file_name = %upload.file_name, size = upload.bytes.len()))]
    pub async fn store(
        &self,
        upload: &FileUpload,
        owner_id: &str,
    ) -> Result<StoredObject, StorageError> {
        self.check(upload)?;

        let key = object_key(owner_id, &upload.file_name);
        self.backend
            .upload(&key, upload.bytes.clone(), &upload.content_type)
            .await?;

        let public_url = self.backend.public_url(&key);
        info!(key = %key, "bill file stored");
        Ok(StoredObject { key, public_url })
    }

    /// Public URL first; on any failure, an authenticated download by stored key.
    #[instrument(skip(self))]
    pub async fn retrieve(
        &self,
        key: &str,
        public_url: &str,
    ) -> Result<RetrievedObject, StorageError> {
        match self.backend.fetch_public(public_url).await {
            Ok(object) => Ok(object),
            Err(public_err) => {
                warn!(error = %public_err, "public fetch failed, falling back to authenticated download");
                self.backend.download(key).await
            }
        }
    }
}

pub fn is_accepted_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/pdf" || (essence.starts_with("image/") && essence.len() > "image/".len())
}

/// Builds a collision-resistant key namespaced by owner and upload time
pub fn object_key(owner_id: &str, file_name: &str) -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!(
        "{}/{}_{}_{}",
        sanitize_segment(owner_id, "anonymous"),
        Utc::now().timestamp_millis(),
        &nonce[..8],
        sanitize_segment(file_name, "upload")
    )
}

fn sanitize_segment(raw: &str, fallback: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Last path segment of a stored key
pub fn filename_from_key(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

pub fn content_type_for_filename(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "svg" => "image/svg+xml",
        _ => FALLBACK_CONTENT_TYPE,
    }
}
