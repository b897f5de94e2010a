use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::stage::PipelineStage;
use super::upload_event::UploadEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaType::Image => write!(f, "image"),
            MediaType::Video => write!(f, "video"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginContext {
    #[default]
    Gallery,
    Exhibition,
}

impl FromStr for OriginContext {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gallery" => Ok(OriginContext::Gallery),
            "exhibition" => Ok(OriginContext::Exhibition),
            _ => Err(anyhow::anyhow!("Invalid origin context: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginRole {
    #[default]
    Gallery,
    Feature,
    Attachment,
}

impl FromStr for OriginRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gallery" => Ok(OriginRole::Gallery),
            "feature" => Ok(OriginRole::Feature),
            "attachment" => Ok(OriginRole::Attachment),
            _ => Err(anyhow::anyhow!("Invalid origin role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    pub context: OriginContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exhibition_id: Option<String>,
    pub role: OriginRole,
}

/// Location of the uploaded original. No read URL is ever minted for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalPath {
    pub storage_path: String,
    #[serde(rename = "downloadURL")]
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivativeEntry {
    pub storage_path: String,
    #[serde(rename = "downloadURL")]
    pub download_url: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPaths {
    pub original: OriginalPath,
    #[serde(default)]
    pub derivatives: BTreeMap<String, DerivativeEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<DerivativeEntry>,
}

/// Advisory progress marker, overwritten on every stage transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingState {
    pub stage: String,
    pub progress: u8,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingState {
    pub fn at(stage: &dyn PipelineStage, now: DateTime<Utc>) -> Self {
        Self {
            stage: stage.to_string(),
            progress: stage.progress(),
            updated_at: now,
        }
    }
}

/// Document stored in the `media` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    pub id: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub upload_id: Option<String>,
    pub original_filename: String,
    pub storage_path: String,
    pub origin: Origin,
    pub paths: MediaPaths,
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    pub mime_type: String,
    pub size_bytes: u64,
    pub codec: Option<String>,
    pub bitrate: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blur_hash: Option<String>,
    pub processing: ProcessingState,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl MediaAsset {
    /// Initial document shape written at the start of every pipeline run.
    pub fn initial(
        id: impl Into<String>,
        media_type: MediaType,
        event: &UploadEvent,
        stage: &dyn PipelineStage,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            media_type,
            upload_id: event.upload_id().map(str::to_string),
            original_filename: event.original_filename(),
            storage_path: event.key.clone(),
            origin: event.origin(),
            paths: MediaPaths {
                original: OriginalPath {
                    storage_path: event.key.clone(),
                    download_url: None,
                },
                derivatives: BTreeMap::new(),
                poster: None,
            },
            width: None,
            height: None,
            duration: match media_type {
                MediaType::Video => Some(0),
                MediaType::Image => None,
            },
            mime_type: event.content_type.clone(),
            size_bytes: event.size_bytes,
            codec: None,
            bitrate: None,
            blur_hash: None,
            processing: ProcessingState::at(stage, now),
            processed: false,
            created_at: now,
            modified_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Stored JSON shape. Images always carry `blurHash`, `null` until a hash is computed.
    pub fn to_document(&self) -> serde_json::Result<JsonValue> {
        let mut document = serde_json::to_value(self)?;
        if self.media_type == MediaType::Image {
            if let JsonValue::Object(fields) = &mut document {
                fields.entry("blurHash").or_insert(JsonValue::Null);
            }
        }
        Ok(document)
    }
}

/// Fields merged into the document when a pipeline completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFinalization {
    pub derivatives: BTreeMap<String, DerivativeEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<DerivativeEntry>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blur_hash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImageStage, VideoStage};

    #[test]
    fn initial_image_document_shape() {
        let event = UploadEvent::new("uploads/images/123/photo.jpg", "image/jpeg", 2048)
            .with_metadata("uploadId", "abc");
        let now = Utc::now();
        let asset = MediaAsset::initial("abc", MediaType::Image, &event, &ImageStage::Created, now);
        let json = serde_json::to_value(&asset).unwrap();

        assert_eq!(json["type"], "image");
        assert_eq!(json["uploadId"], "abc");
        assert_eq!(json["storagePath"], "uploads/images/123/photo.jpg");
        assert!(json["paths"]["original"]["downloadURL"].is_null());
        assert_eq!(json["paths"]["derivatives"], serde_json::json!({}));
        assert_eq!(json["processing"]["stage"], "created");
        assert_eq!(json["processing"]["progress"], 20);
        assert_eq!(json["processed"], false);
        assert!(json.get("duration").is_none());
        assert_eq!(json["origin"]["context"], "gallery");
    }

    #[test]
    fn only_image_documents_store_a_null_blur_hash() {
        let now = Utc::now();
        let image_event = UploadEvent::new("uploads/images/p.jpg", "image/jpeg", 1);
        let image = MediaAsset::initial("i", MediaType::Image, &image_event, &ImageStage::Created, now);
        let document = image.to_document().unwrap();
        assert!(document.as_object().unwrap().contains_key("blurHash"));
        assert!(document["blurHash"].is_null());

        let video_event = UploadEvent::new("uploads/videos/v.mp4", "video/mp4", 1);
        let video = MediaAsset::initial("v", MediaType::Video, &video_event, &VideoStage::Created, now);
        assert!(!video.to_document().unwrap().as_object().unwrap().contains_key("blurHash"));
    }

    #[test]
    fn initial_video_document_has_zero_duration() {
        let event = UploadEvent::new("uploads/videos/clip.mp4", "video/mp4", 10);
        let asset = MediaAsset::initial(
            "v1",
            MediaType::Video,
            &event,
            &VideoStage::Created,
            Utc::now(),
        );
        assert_eq!(asset.duration, Some(0));
        assert!(asset.paths.derivatives.is_empty());
        assert_eq!(asset.processing.progress, 10);
    }

    #[test]
    fn document_round_trips_through_json() {
        let event = UploadEvent::new("uploads/images/a.png", "image/png", 1);
        let asset = MediaAsset::initial("a", MediaType::Image, &event, &ImageStage::Created, Utc::now());
        let value = serde_json::to_value(&asset).unwrap();
        let back: MediaAsset = serde_json::from_value(value).unwrap();
        assert_eq!(back, asset);
    }
}
