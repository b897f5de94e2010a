//! Blob store abstraction trait
//!
//! This module defines the BlobStore trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Whether retrying the same call later can succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            StorageError::NotFound(_) | StorageError::InvalidKey(_) | StorageError::ConfigError(_)
        )
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Object attributes returned by [`BlobStore::head`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobMetadata {
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub custom_metadata: HashMap<String, String>,
}

/// Blob store abstraction trait
///
/// A key-value byte store. Pipelines stage objects through local files, so the
/// transfer methods take filesystem paths rather than in-memory buffers.
///
/// **Key format:** keys are `/`-separated, never start with `/` and never contain `..`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Download an object into `destination`, returning the number of bytes written.
    async fn download_to(&self, key: &str, destination: &Path) -> StorageResult<u64>;

    /// Upload a local file to `key`, overwriting any existing object.
    /// Returns the uploaded size in bytes.
    async fn upload_from(&self, source: &Path, key: &str, content_type: &str)
        -> StorageResult<u64>;

    /// Store an in-memory object together with its custom metadata.
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> StorageResult<()>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Long-lived, token-bearing read URL for an existing object.
    async fn mint_durable_url(&self, key: &str) -> StorageResult<String>;

    async fn head(&self, key: &str) -> StorageResult<BlobMetadata>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
