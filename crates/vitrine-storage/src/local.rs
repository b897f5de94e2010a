use crate::keys::validate_key;
use crate::tokens::{carry_over_tokens, ensure_download_token, url_with_token};
use crate::traits::{BlobMetadata, BlobStore, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const SIDECAR_SUFFIX: &str = ".meta.json";

/// Content type and custom metadata kept next to each stored file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Sidecar {
    content_type: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Local filesystem storage implementation
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/vitrine/bucket")
    /// * `base_url` - Base URL for serving files (e.g., "http://localhost:8080/files")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
        })
    }

    /// Convert storage key to filesystem path with security validation
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        validate_key(storage_key)?;
        if storage_key.ends_with(SIDECAR_SUFFIX) {
            return Err(StorageError::InvalidKey(format!(
                "Storage keys may not end with {}",
                SIDECAR_SUFFIX
            )));
        }

        let path = self.base_path.join(storage_key);
        if path.strip_prefix(&self.base_path).is_err() {
            return Err(StorageError::InvalidKey(
                "Storage key resolves outside storage directory".to_string(),
            ));
        }

        Ok(path)
    }

    fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(SIDECAR_SUFFIX);
        PathBuf::from(name)
    }

    async fn read_sidecar(path: &Path) -> StorageResult<Sidecar> {
        let sidecar = Self::sidecar_path(path);
        match fs::read(&sidecar).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| {
                StorageError::BackendError(format!(
                    "Corrupt metadata file {}: {}",
                    sidecar.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Sidecar::default()),
            Err(e) => Err(StorageError::IoError(e)),
        }
    }

    async fn write_sidecar(path: &Path, sidecar: &Sidecar) -> StorageResult<()> {
        let raw = serde_json::to_vec(sidecar)
            .map_err(|e| StorageError::BackendError(e.to_string()))?;
        fs::write(Self::sidecar_path(path), raw).await?;
        Ok(())
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn require_existing(&self, storage_key: &str) -> StorageResult<PathBuf> {
        let path = self.key_to_path(storage_key)?;
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(storage_key.to_string()));
        }
        Ok(path)
    }
}

#[async_trait]
impl BlobStore for LocalStorage {
    async fn download_to(&self, key: &str, destination: &Path) -> StorageResult<u64> {
        let path = self.require_existing(key).await?;
        let start = std::time::Instant::now();

        let size = fs::copy(&path, destination).await.map_err(|e| {
            StorageError::DownloadFailed(format!(
                "Failed to copy {} to {}: {}",
                path.display(),
                destination.display(),
                e
            ))
        })?;

        tracing::info!(
            key = %key,
            destination = %destination.display(),
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage download successful"
        );

        Ok(size)
    }

    async fn upload_from(
        &self,
        source: &Path,
        key: &str,
        content_type: &str,
    ) -> StorageResult<u64> {
        let path = self.key_to_path(key)?;
        self.ensure_parent_dir(&path).await?;
        let start = std::time::Instant::now();

        let size = fs::copy(source, &path).await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to copy {} to {}: {}",
                source.display(),
                path.display(),
                e
            ))
        })?;

        let previous = Self::read_sidecar(&path).await?;
        let mut metadata = HashMap::new();
        carry_over_tokens(&previous.metadata, &mut metadata);
        Self::write_sidecar(
            &path,
            &Sidecar {
                content_type: Some(content_type.to_string()),
                metadata,
            },
        )
        .await?;

        tracing::info!(
            key = %key,
            source = %source.display(),
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(size)
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        let size = data.len();
        self.ensure_parent_dir(&path).await?;
        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(&data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        Self::write_sidecar(
            &path,
            &Sidecar {
                content_type: Some(content_type.to_string()),
                metadata: metadata.clone(),
            },
        )
        .await?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage put successful"
        );

        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete file {}: {}", path.display(), e))
        })?;

        let sidecar = Self::sidecar_path(&path);
        if let Err(e) = fs::remove_file(&sidecar).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, path = %sidecar.display(), "Failed to remove metadata file");
            }
        }

        tracing::info!(
            path = %path.display(),
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    async fn mint_durable_url(&self, key: &str) -> StorageResult<String> {
        let path = self.require_existing(key).await?;
        let mut sidecar = Self::read_sidecar(&path).await?;
        let (token, created) = ensure_download_token(&mut sidecar.metadata);
        if created {
            Self::write_sidecar(&path, &sidecar).await?;
        }
        Ok(url_with_token(&self.base_url, key, &token))
    }

    async fn head(&self, key: &str) -> StorageResult<BlobMetadata> {
        let path = self.require_existing(key).await?;
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;
        let sidecar = Self::read_sidecar(&path).await?;
        Ok(BlobMetadata {
            size_bytes: meta.len(),
            content_type: sidecar.content_type,
            custom_metadata: sidecar.metadata,
        })
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
