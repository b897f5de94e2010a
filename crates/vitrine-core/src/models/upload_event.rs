use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::metadata_keys;

use super::media::{MediaType, Origin, OriginContext, OriginRole};

/// Normalized "object finalized" notification from the blob store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    pub key: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub custom_metadata: HashMap<String, String>,
}

impl UploadEvent {
    pub fn new(key: impl Into<String>, content_type: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            bucket: None,
            key: key.into(),
            content_type: content_type.into(),
            size_bytes,
            custom_metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_metadata.insert(key.into(), value.into());
        self
    }

    fn metadata(&self, key: &str) -> Option<&str> {
        self.custom_metadata
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn upload_id(&self) -> Option<&str> {
        self.metadata(metadata_keys::UPLOAD_ID)
    }

    /// `originalFilename` metadata, falling back to the last key segment.
    pub fn original_filename(&self) -> String {
        self.metadata(metadata_keys::ORIGINAL_FILENAME)
            .map(str::to_string)
            .unwrap_or_else(|| {
                self.key
                    .rsplit('/')
                    .next()
                    .unwrap_or(self.key.as_str())
                    .to_string()
            })
    }

    /// Origin fields with gallery fallbacks for missing or unknown values.
    pub fn origin(&self) -> Origin {
        let context = self
            .metadata(metadata_keys::ORIGIN_CONTEXT)
            .and_then(|v| v.parse::<OriginContext>().ok())
            .unwrap_or_default();
        let role = self
            .metadata(metadata_keys::ORIGIN_ROLE)
            .and_then(|v| v.parse::<OriginRole>().ok())
            .unwrap_or_default();
        Origin {
            context,
            exhibition_id: self.metadata(metadata_keys::EXHIBITION_ID).map(str::to_string),
            role,
        }
    }

    /// Pipeline selected by content type and key prefix, if any.
    pub fn classify(&self, image_prefix: &str, video_prefix: &str) -> Option<MediaType> {
        let content_type = self.content_type.to_ascii_lowercase();
        if content_type.starts_with("image/") && self.key.starts_with(image_prefix) {
            Some(MediaType::Image)
        } else if content_type.starts_with("video/") && self.key.starts_with(video_prefix) {
            Some(MediaType::Video)
        } else {
            None
        }
    }
}
