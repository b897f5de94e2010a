use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value as JsonValue};
use vitrine_core::constants::MEDIA_COLLECTION;
use vitrine_core::models::{MediaAsset, MediaFinalization, PipelineStage, ProcessingState};

use super::document::{DbResult, DocumentStore, DocumentStoreExt, SetOptions};

/// Result of [`MediaAssetRepository::start_processing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingStart {
    /// The initial document was written. Carries the stage of the unfinished run it replaced.
    Started { previous_stage: Option<String> },
    AlreadyProcessed,
}

/// Media asset repository
///
/// Every write is keyed by the media id, so replaying a pipeline run rewrites the
/// same document instead of creating another one.
#[derive(Clone)]
pub struct MediaAssetRepository {
    store: Arc<dyn DocumentStore>,
}

impl MediaAssetRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self), fields(db.collection = MEDIA_COLLECTION))]
    pub async fn get(&self, id: &str) -> DbResult<Option<MediaAsset>> {
        self.store.get_as(MEDIA_COLLECTION, id).await
    }

    /// Write the initial document unless the stored asset already finished processing.
    ///
    /// The read and the overwrite share one transaction, so a `processed` document is
    /// never replaced by a concurrent redelivery.
    #[tracing::instrument(skip(self, asset), fields(db.collection = MEDIA_COLLECTION, media_id = %asset.id))]
    pub async fn start_processing(&self, asset: &MediaAsset) -> DbResult<ProcessingStart> {
        let mut tx = self.store.begin().await?;
        let previous_stage = match tx.get(MEDIA_COLLECTION, &asset.id).await? {
            Some(existing) => {
                if existing
                    .get("processed")
                    .and_then(JsonValue::as_bool)
                    .unwrap_or(false)
                {
                    return Ok(ProcessingStart::AlreadyProcessed);
                }
                existing
                    .pointer("/processing/stage")
                    .and_then(JsonValue::as_str)
                    .map(str::to_string)
            }
            None => None,
        };
        tx.set(
            MEDIA_COLLECTION,
            &asset.id,
            asset.to_document()?,
            SetOptions::overwrite(),
        )
        .await?;
        tx.commit().await?;
        Ok(ProcessingStart::Started { previous_stage })
    }

    /// Overwrite `processing` with the given stage.
    pub async fn record_stage(&self, id: &str, stage: &dyn PipelineStage) -> DbResult<()> {
        self.record_stage_with(id, stage, Map::new()).await
    }

    /// Overwrite `processing` and set additional top-level or dotted fields.
    pub async fn record_stage_with(
        &self,
        id: &str,
        stage: &dyn PipelineStage,
        mut fields: Map<String, JsonValue>,
    ) -> DbResult<()> {
        let now = Utc::now();
        fields.insert(
            "processing".to_string(),
            serde_json::to_value(ProcessingState::at(stage, now))?,
        );
        fields.insert("modifiedAt".to_string(), serde_json::to_value(now)?);
        self.store
            .update(MEDIA_COLLECTION, id, JsonValue::Object(fields))
            .await?;
        tracing::debug!(
            media_id = %id,
            stage = %stage,
            progress = stage.progress(),
            "Recorded processing stage"
        );
        Ok(())
    }

    /// Merge the final results and mark the asset processed.
    ///
    /// `paths.derivatives` is replaced as a whole so a rerun never leaves stale keys.
    #[tracing::instrument(skip(self, result, stage), fields(db.collection = MEDIA_COLLECTION))]
    pub async fn finalize(
        &self,
        id: &str,
        result: &MediaFinalization,
        stage: &dyn PipelineStage,
    ) -> DbResult<()> {
        let mut fields = Map::new();
        fields.insert(
            "paths.derivatives".to_string(),
            serde_json::to_value(&result.derivatives)?,
        );
        if let Some(poster) = &result.poster {
            fields.insert("paths.poster".to_string(), serde_json::to_value(poster)?);
        }
        fields.insert("width".to_string(), json!(result.width));
        fields.insert("height".to_string(), json!(result.height));
        if let Some(duration) = result.duration {
            fields.insert("duration".to_string(), json!(duration));
        }
        if let Some(codec) = &result.codec {
            fields.insert("codec".to_string(), json!(codec));
        }
        if let Some(bitrate) = result.bitrate {
            fields.insert("bitrate".to_string(), json!(bitrate));
        }
        if let Some(blur_hash) = &result.blur_hash {
            fields.insert("blurHash".to_string(), json!(blur_hash));
        }
        fields.insert("processed".to_string(), JsonValue::Bool(true));
        self.record_stage_with(id, stage, fields).await
    }

    /// Mark an asset deleted without removing the document.
    #[tracing::instrument(skip(self), fields(db.collection = MEDIA_COLLECTION))]
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let now = serde_json::to_value(Utc::now())?;
        self.store
            .update(
                MEDIA_COLLECTION,
                id,
                json!({ "deletedAt": now.clone(), "modifiedAt": now }),
            )
            .await
    }
}
