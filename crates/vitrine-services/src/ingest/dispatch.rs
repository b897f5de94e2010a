//! Routes finalize events to the image or video pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use vitrine_core::models::{MediaType, UploadEvent};
use vitrine_core::{EventError, IngestConfig};
use vitrine_db::{DocumentStore, MediaAssetRepository};
use vitrine_processing::{ImageCodec, VideoCodec};
use vitrine_storage::BlobStore;
use vitrine_worker::{HandlerOutcome, UploadEventHandler};

use super::error::PipelineError;
use super::image::ImagePipeline;
use super::video::VideoPipeline;

#[derive(Clone)]
pub struct IngestDispatcher {
    image: ImagePipeline,
    video: VideoPipeline,
    config: Arc<IngestConfig>,
}

impl IngestDispatcher {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        documents: Arc<dyn DocumentStore>,
        image_codec: Arc<dyn ImageCodec>,
        video_codec: Arc<dyn VideoCodec>,
        config: IngestConfig,
    ) -> Self {
        let config = Arc::new(config);
        let media = MediaAssetRepository::new(documents);
        Self {
            image: ImagePipeline::new(blobs.clone(), media.clone(), image_codec, config.clone()),
            video: VideoPipeline::new(blobs, media, video_codec, config.clone()),
            config,
        }
    }

    /// Media id for an event: the `uploadId` metadata when present, else a fresh UUID.
    pub fn media_id_for(event: &UploadEvent) -> String {
        event
            .upload_id()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    /// Run the matching pipeline, or return `Skipped` when none applies.
    pub async fn dispatch(&self, event: &UploadEvent) -> Result<HandlerOutcome, PipelineError> {
        let media_type = event.classify(
            &self.config.image_upload_prefix,
            &self.config.video_upload_prefix,
        );
        let Some(media_type) = media_type else {
            tracing::debug!(
                key = %event.key,
                content_type = %event.content_type,
                "Upload event matches no pipeline, skipping"
            );
            return Ok(HandlerOutcome::Skipped);
        };

        let media_id = Self::media_id_for(event);
        tracing::info!(
            media_id = %media_id,
            media_type = %media_type,
            key = %event.key,
            size_bytes = event.size_bytes,
            "Dispatching upload event"
        );
        match media_type {
            MediaType::Image => self.image.run(event, &media_id).await,
            MediaType::Video => self.video.run(event, &media_id).await,
        }
    }
}

#[async_trait]
impl UploadEventHandler for IngestDispatcher {
    async fn handle(&self, event: &UploadEvent) -> Result<HandlerOutcome, EventError> {
        self.dispatch(event).await.map_err(EventError::from)
    }
}
