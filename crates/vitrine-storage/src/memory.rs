use crate::keys::validate_key;
use crate::tokens::{carry_over_tokens, ensure_download_token, url_with_token};
use crate::traits::{BlobMetadata, BlobStore, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    content_type: String,
    metadata: HashMap<String, String>,
}

/// In-process blob store for tests and local experiments.
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, MemoryObject>>,
    base_url: String,
    fail_deletes: AtomicBool,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new("memory://bucket")
    }
}

impl MemoryStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            base_url: base_url.into(),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `delete` fail with a backend error.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Sorted list of stored keys.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn get_bytes(&self, key: &str) -> Option<Bytes> {
        self.objects.read().await.get(key).map(|o| o.data.clone())
    }

    async fn store(&self, key: &str, data: Bytes, content_type: &str, mut metadata: HashMap<String, String>) {
        let mut objects = self.objects.write().await;
        if let Some(previous) = objects.get(key) {
            carry_over_tokens(&previous.metadata, &mut metadata);
        }
        objects.insert(
            key.to_string(),
            MemoryObject {
                data,
                content_type: content_type.to_string(),
                metadata,
            },
        );
    }
}

#[async_trait]
impl BlobStore for MemoryStorage {
    async fn download_to(&self, key: &str, destination: &Path) -> StorageResult<u64> {
        validate_key(key)?;
        let data = self
            .get_bytes(key)
            .await
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        fs::write(destination, &data).await.map_err(|e| {
            StorageError::DownloadFailed(format!(
                "Failed to write {}: {}",
                destination.display(),
                e
            ))
        })?;
        Ok(data.len() as u64)
    }

    async fn upload_from(
        &self,
        source: &Path,
        key: &str,
        content_type: &str,
    ) -> StorageResult<u64> {
        validate_key(key)?;
        let data = fs::read(source).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to read {}: {}", source.display(), e))
        })?;
        let size = data.len() as u64;
        self.store(key, Bytes::from(data), content_type, HashMap::new())
            .await;
        tracing::debug!(key = %key, size_bytes = size, "Memory storage upload");
        Ok(size)
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> StorageResult<()> {
        validate_key(key)?;
        self.store(key, data, content_type, metadata.clone()).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::DeleteFailed(format!(
                "Delete rejected for {}",
                key
            )));
        }
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn mint_durable_url(&self, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        let (token, _) = ensure_download_token(&mut object.metadata);
        Ok(url_with_token(&self.base_url, key, &token))
    }

    async fn head(&self, key: &str) -> StorageResult<BlobMetadata> {
        validate_key(key)?;
        let objects = self.objects.read().await;
        let object = objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(BlobMetadata {
            size_bytes: object.data.len() as u64,
            content_type: Some(object.content_type.clone()),
            custom_metadata: object.metadata.clone(),
        })
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.objects.read().await.contains_key(key))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}
