//! Image ingestion: webp variants, blurhash, upload, original cleanup.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use vitrine_core::models::{ImageStage, MediaFinalization, MediaType, UploadEvent};
use vitrine_core::IngestConfig;
use vitrine_db::MediaAssetRepository;
use vitrine_processing::ImageCodec;
use vitrine_storage::keys::derivative_key;
use vitrine_storage::BlobStore;
use vitrine_worker::HandlerOutcome;

use super::derivatives::{delete_original, publish};
use super::error::PipelineError;
use super::staging::BlobStaging;
use super::{begin_run, checkpoint, RunStart};

const WEBP_CONTENT_TYPE: &str = "image/webp";

#[derive(Clone)]
pub struct ImagePipeline {
    blobs: Arc<dyn BlobStore>,
    media: MediaAssetRepository,
    codec: Arc<dyn ImageCodec>,
    config: Arc<IngestConfig>,
}

impl ImagePipeline {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        media: MediaAssetRepository,
        codec: Arc<dyn ImageCodec>,
        config: Arc<IngestConfig>,
    ) -> Self {
        Self {
            blobs,
            media,
            codec,
            config,
        }
    }

    #[tracing::instrument(skip(self, event), fields(media_id = %media_id, key = %event.key))]
    pub async fn run(
        &self,
        event: &UploadEvent,
        media_id: &str,
    ) -> Result<HandlerOutcome, PipelineError> {
        let start = Instant::now();

        match begin_run(&self.media, media_id, MediaType::Image, event, &ImageStage::Created).await? {
            RunStart::AlreadyProcessed => {
                return Ok(HandlerOutcome::AlreadyProcessed {
                    media_id: media_id.to_string(),
                })
            }
            RunStart::Fresh => {}
        }

        let staging = BlobStaging::create(media_id, self.config.temp_dir.as_deref())?;
        let (original, original_size) = staging
            .download_original(self.blobs.as_ref(), &event.key)
            .await?;
        checkpoint(&self.media, media_id, &ImageStage::Downloaded).await?;

        let output_dir = staging.subdir("variants").await?;
        let variants = self
            .codec
            .resize_to_webp(&original, &output_dir, &self.config.image_variants)
            .await
            .map_err(|e| PipelineError::codec("resize to webp", e))?;

        let blur_hash = if self.config.blurhash_enabled {
            match self.codec.perceptual_hash(&original).await {
                Ok(hash) => Some(hash),
                Err(e) => {
                    tracing::warn!(error = %e, "Blurhash generation failed, leaving it empty");
                    None
                }
            }
        } else {
            None
        };
        checkpoint(&self.media, media_id, &ImageStage::VariantsReady).await?;

        let mut derivatives = BTreeMap::new();
        for variant in &variants {
            let key = derivative_key(&self.config.derivative_prefix, media_id, &variant.key, "webp");
            let entry = publish(
                self.blobs.as_ref(),
                &variant.path,
                &key,
                WEBP_CONTENT_TYPE,
                Some((variant.width, variant.height)),
            )
            .await?;
            derivatives.insert(variant.key.clone(), entry);
        }
        checkpoint(&self.media, media_id, &ImageStage::DerivativesReady).await?;

        delete_original(self.blobs.as_ref(), media_id, &event.key).await;
        checkpoint(&self.media, media_id, &ImageStage::OriginalDeleted).await?;

        let largest = variants.iter().max_by_key(|v| v.width);
        let result = MediaFinalization {
            derivatives,
            width: largest.map(|v| v.width),
            height: largest.map(|v| v.height),
            blur_hash,
            ..Default::default()
        };
        self.media
            .finalize(media_id, &result, &ImageStage::Done)
            .await
            .map_err(|e| PipelineError::store("finalize media document", e))?;

        tracing::info!(
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            original_size_bytes = original_size,
            variants = variants.len(),
            "Image ingestion completed"
        );
        Ok(HandlerOutcome::Processed {
            media_id: media_id.to_string(),
        })
    }
}
