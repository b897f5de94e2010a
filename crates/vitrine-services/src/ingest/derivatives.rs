use std::path::Path;

use vitrine_core::models::DerivativeEntry;
use vitrine_storage::BlobStore;

use super::error::PipelineError;

/// Upload a local derivative and mint its durable URL.
pub(crate) async fn publish(
    blobs: &dyn BlobStore,
    local: &Path,
    key: &str,
    content_type: &str,
    dimensions: Option<(u32, u32)>,
) -> Result<DerivativeEntry, PipelineError> {
    let size_bytes = blobs
        .upload_from(local, key, content_type)
        .await
        .map_err(|e| PipelineError::storage("upload derivative", e))?;
    let download_url = blobs
        .mint_durable_url(key)
        .await
        .map_err(|e| PipelineError::storage("mint download url", e))?;

    tracing::debug!(key = %key, size_bytes, "Derivative uploaded");
    Ok(DerivativeEntry {
        storage_path: key.to_string(),
        download_url,
        size_bytes,
        width: dimensions.map(|(w, _)| w),
        height: dimensions.map(|(_, h)| h),
    })
}

/// Delete the original upload. Failures are logged and ignored.
pub(crate) async fn delete_original(blobs: &dyn BlobStore, media_id: &str, key: &str) {
    match blobs.delete(key).await {
        Ok(()) => tracing::debug!(media_id = %media_id, key = %key, "Original deleted"),
        Err(e) => tracing::warn!(
            media_id = %media_id,
            key = %key,
            error = %e,
            "Failed to delete original, continuing"
        ),
    }
}
