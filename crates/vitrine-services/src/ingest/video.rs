//! Video ingestion: probe, poster, bounded webm transcodes, upload, original cleanup.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use vitrine_core::models::{
    DerivativeEntry, MediaFinalization, MediaType, PipelineStage, UploadEvent, VideoStage,
};
use vitrine_core::IngestConfig;
use vitrine_db::MediaAssetRepository;
use vitrine_processing::{VideoCodec, VideoMetadata};
use vitrine_storage::keys::{poster_key, video_variant_key, webm_variant_name};
use vitrine_storage::BlobStore;
use vitrine_worker::{run_bounded_with_progress, HandlerOutcome};

use super::derivatives::{delete_original, publish};
use super::error::PipelineError;
use super::staging::BlobStaging;
use super::{begin_run, checkpoint, RunStart};

const WEBM_CONTENT_TYPE: &str = "video/webm";
const POSTER_CONTENT_TYPE: &str = "image/jpeg";

/// Width ffmpeg picks for `scale=-2:{height}`: aspect preserving, rounded to even.
fn scaled_width(source: &VideoMetadata, height: u32) -> Option<u32> {
    if source.width == 0 || source.height == 0 {
        return None;
    }
    let exact = source.width as f64 * height as f64 / source.height as f64;
    Some(((exact / 2.0).round() as u32 * 2).max(2))
}

#[derive(Clone)]
pub struct VideoPipeline {
    blobs: Arc<dyn BlobStore>,
    media: MediaAssetRepository,
    codec: Arc<dyn VideoCodec>,
    config: Arc<IngestConfig>,
}

impl VideoPipeline {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        media: MediaAssetRepository,
        codec: Arc<dyn VideoCodec>,
        config: Arc<IngestConfig>,
    ) -> Self {
        Self {
            blobs,
            media,
            codec,
            config,
        }
    }

    /// Target heights, ascending and without duplicates.
    fn heights(&self) -> Vec<u32> {
        let mut heights = self.config.video_heights.clone();
        heights.sort_unstable();
        heights.dedup();
        heights
    }

    #[tracing::instrument(skip(self, event), fields(media_id = %media_id, key = %event.key))]
    pub async fn run(
        &self,
        event: &UploadEvent,
        media_id: &str,
    ) -> Result<HandlerOutcome, PipelineError> {
        let start = Instant::now();

        match begin_run(&self.media, media_id, MediaType::Video, event, &VideoStage::Created).await? {
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
        checkpoint(&self.media, media_id, &VideoStage::Downloaded).await?;

        let metadata = self
            .codec
            .probe(&original)
            .await
            .map_err(|e| PipelineError::codec("probe", e))?;
        checkpoint(&self.media, media_id, &VideoStage::Metadata).await?;

        let poster_path = staging.file("poster.jpg");
        self.codec
            .extract_poster(
                &original,
                &poster_path,
                self.config.poster_offset_secs,
                self.config.poster_width,
            )
            .await
            .map_err(|e| PipelineError::codec("extract poster", e))?;
        checkpoint(&self.media, media_id, &VideoStage::PosterGenerated).await?;

        let poster = publish(
            self.blobs.as_ref(),
            &poster_path,
            &poster_key(&self.config.derivative_prefix, media_id),
            POSTER_CONTENT_TYPE,
            None,
        )
        .await?;
        checkpoint(&self.media, media_id, &VideoStage::PosterUploaded).await?;

        let renditions_dir = staging.subdir("renditions").await?;
        let derivatives = self
            .transcode_all(media_id, &original, &renditions_dir, &metadata)
            .await?;

        delete_original(self.blobs.as_ref(), media_id, &event.key).await;
        checkpoint(&self.media, media_id, &VideoStage::OriginalDeleted).await?;

        let result = MediaFinalization {
            derivatives,
            poster: Some(poster),
            width: Some(metadata.width),
            height: Some(metadata.height),
            duration: Some(metadata.rounded_duration()),
            codec: Some(metadata.codec.clone()),
            bitrate: metadata.bitrate,
            blur_hash: None,
        };
        self.media
            .finalize(media_id, &result, &VideoStage::Done)
            .await
            .map_err(|e| PipelineError::store("finalize media document", e))?;

        tracing::info!(
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            original_size_bytes = original_size,
            video_duration = metadata.duration,
            renditions = result.derivatives.len(),
            "Video ingestion completed"
        );
        Ok(HandlerOutcome::Processed {
            media_id: media_id.to_string(),
        })
    }

    /// Transcode every target height through the bounded runner.
    ///
    /// Each job uploads its rendition and removes the local file. Progress is written
    /// in ascending height order as jobs finish, whichever job that was.
    async fn transcode_all(
        &self,
        media_id: &str,
        original: &Path,
        output_dir: &Path,
        metadata: &VideoMetadata,
    ) -> Result<BTreeMap<String, DerivativeEntry>, PipelineError> {
        let heights = self.heights();
        let blobs = self.blobs.as_ref();
        let codec = self.codec.as_ref();
        let prefix = self.config.derivative_prefix.as_str();

        let jobs = heights
            .iter()
            .map(|&height| async move {
                let local = codec
                    .transcode_to_webm(original, output_dir, height)
                    .await
                    .map_err(|e| PipelineError::codec("transcode to webm", e))?;
                let key = video_variant_key(prefix, media_id, height);
                let dimensions = scaled_width(metadata, height).map(|w| (w, height));
                let entry = publish(blobs, &local, &key, WEBM_CONTENT_TYPE, dimensions).await?;
                if let Err(e) = tokio::fs::remove_file(&local).await {
                    tracing::debug!(error = %e, path = %local.display(), "Failed to remove local rendition");
                }
                Ok::<_, PipelineError>((webm_variant_name(height), entry))
            })
            .collect::<Vec<_>>();

        let media = &self.media;
        let progress_heights = heights.as_slice();
        let renditions = run_bounded_with_progress(
            jobs,
            self.config.max_concurrent_transcodes,
            |completed| async move {
                let stage = VideoStage::transcoded(progress_heights, completed);
                // Progress is advisory; the final merge decides completion.
                if let Err(e) = media.record_stage(media_id, &stage).await {
                    tracing::warn!(
                        error = %e,
                        stage = %stage,
                        progress = stage.progress(),
                        "Failed to record transcode progress"
                    );
                }
            },
        )
        .await
        .map_err(|e| e.into_inner())?;

        Ok(renditions.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(width: u32, height: u32) -> VideoMetadata {
        VideoMetadata {
            duration: 4.0,
            width,
            height,
            codec: "h264".into(),
            bitrate: None,
            framerate: None,
        }
    }

    #[test]
    fn scaled_width_matches_even_rounding() {
        assert_eq!(scaled_width(&metadata(1920, 1080), 720), Some(1280));
        assert_eq!(scaled_width(&metadata(1920, 1080), 360), Some(640));
        assert_eq!(scaled_width(&metadata(1080, 1920), 360), Some(202));
        assert_eq!(scaled_width(&metadata(0, 0), 360), None);
    }
}
