use super::{ObjectStorage, RetrievedObject, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Process-local object store for development and tests
#[derive(Debug)]
pub struct InMemoryStorage {
    bucket: String,
    objects: RwLock<HashMap<String, (Bytes, String)>>,
    public_access: bool,
    uploads: AtomicUsize,
    public_fetches: AtomicUsize,
    downloads: AtomicUsize,
}

impl InMemoryStorage {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(HashMap::new()),
            public_access: true,
            uploads: AtomicUsize::new(0),
            public_fetches: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
        }
    }

    /// Public URLs stop resolving, as with a private or misconfigured bucket
    pub fn without_public_access(mut self) -> Self {
        self.public_access = false;
        self
    }

    fn url_prefix(&self) -> String {
        format!("memory://{}/", self.bucket)
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn public_fetches(&self) -> usize {
        self.public_fetches.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    async fn get(&self, key: &str) -> Result<RetrievedObject, StorageError> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|(bytes, content_type)| RetrievedObject {
                bytes: bytes.clone(),
                content_type: Some(content_type.clone()),
            })
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn upload(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), StorageError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let mut objects = self.objects.write().await;
        if objects.contains_key(key) {
            return Err(StorageError::Provider(format!("object {key} already exists")));
        }
        objects.insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}{}", self.url_prefix(), key)
    }

    async fn fetch_public(&self, url: &str) -> Result<RetrievedObject, StorageError> {
        self.public_fetches.fetch_add(1, Ordering::SeqCst);
        if !self.public_access {
            return Err(StorageError::Provider("public access disabled".into()));
        }
        let prefix = self.url_prefix();
        let key = url
            .strip_prefix(prefix.as_str())
            .ok_or_else(|| StorageError::NotFound(url.to_string()))?;
        self.get(key).await
    }

    async fn download(&self, key: &str) -> Result<RetrievedObject, StorageError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.get(key).await
    }
}
