//! Shared key conventions for derivatives.
//!
//! Derivatives live under `{prefix}/{media_id}/{variant}.{ext}`:
//! `media/abc/webp_large.webp`, `media/abc/webm_720.webm`, `media/abc/poster.jpg`.

use crate::{StorageError, StorageResult};

/// Reject keys that could escape a backend's namespace.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.contains("..") || key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

pub fn derivative_key(prefix: &str, media_id: &str, variant: &str, extension: &str) -> String {
    format!(
        "{}/{}/{}.{}",
        prefix.trim_end_matches('/'),
        media_id,
        variant,
        extension
    )
}

/// Derivative name for a webm rendition, e.g. `webm_720`.
pub fn webm_variant_name(height: u32) -> String {
    format!("webm_{}", height)
}

pub fn video_variant_key(prefix: &str, media_id: &str, height: u32) -> String {
    derivative_key(prefix, media_id, &webm_variant_name(height), "webm")
}

pub fn poster_key(prefix: &str, media_id: &str) -> String {
    derivative_key(prefix, media_id, "poster", "jpg")
}
