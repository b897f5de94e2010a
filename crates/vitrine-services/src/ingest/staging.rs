//! Per-invocation temp workspace for blob transfers.
//!
//! The directory is removed when the staging value is dropped, on success, on error
//! and when a timed-out pipeline future is cancelled.

use std::path::{Path, PathBuf};

use tempfile::{Builder, TempDir};
use vitrine_storage::BlobStore;

use super::error::PipelineError;

pub struct BlobStaging {
    dir: TempDir,
}

/// Keep ids usable as a directory name fragment.
fn sanitize(media_id: &str) -> String {
    media_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Extension of the last key segment, when it looks like one.
fn extension_of(key: &str) -> Option<&str> {
    let name = key.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then_some(ext)
}

impl BlobStaging {
    /// Create `vitrine-{media_id}-XXXX` under `parent`, or the system temp dir.
    pub fn create(media_id: &str, parent: Option<&Path>) -> Result<Self, PipelineError> {
        let prefix = format!("vitrine-{}-", sanitize(media_id));
        let mut builder = Builder::new();
        builder.prefix(&prefix);
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| PipelineError::io("create temp workspace", e))?;

        tracing::debug!(path = %dir.path().display(), "Created temp workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Create (if needed) and return a subdirectory of the workspace.
    pub async fn subdir(&self, name: &str) -> Result<PathBuf, PipelineError> {
        let path = self.file(name);
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| PipelineError::io("create workspace directory", e))?;
        Ok(path)
    }

    /// Download `key` into the workspace as `original[.ext]`.
    pub async fn download_original(
        &self,
        blobs: &dyn BlobStore,
        key: &str,
    ) -> Result<(PathBuf, u64), PipelineError> {
        let name = match extension_of(key) {
            Some(ext) => format!("original.{}", ext.to_ascii_lowercase()),
            None => "original".to_string(),
        };
        let path = self.file(&name);
        let size = blobs
            .download_to(key, &path)
            .await
            .map_err(|e| PipelineError::storage("download original", e))?;
        Ok((path, size))
    }
}
