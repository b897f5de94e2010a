//! Upload-triggered ingestion.
//!
//! A finalize event goes to [`IngestDispatcher`], which picks the image or the video
//! pipeline by content type and key prefix. Each run stages the original in a private
//! temp workspace, writes progress checkpoints to the `media` document and merges the
//! final result with `processed = true`.

mod derivatives;
pub mod dispatch;
pub mod error;
pub mod image;
pub mod staging;
pub mod video;

pub use dispatch::IngestDispatcher;
pub use error::PipelineError;
pub use image::ImagePipeline;
pub use staging::BlobStaging;
pub use video::VideoPipeline;

use chrono::Utc;
use vitrine_core::models::{MediaAsset, MediaType, PipelineStage, UploadEvent};
use vitrine_db::{MediaAssetRepository, ProcessingStart};

/// Whether a run should proceed after looking at the stored document.
pub(crate) enum RunStart {
    Fresh,
    AlreadyProcessed,
}

/// Write the initial document unless the asset already finished processing.
///
/// Redelivered events for unfinished assets overwrite the document wholesale.
pub(crate) async fn begin_run(
    media: &MediaAssetRepository,
    media_id: &str,
    media_type: MediaType,
    event: &UploadEvent,
    stage: &dyn PipelineStage,
) -> Result<RunStart, PipelineError> {
    let asset = MediaAsset::initial(media_id, media_type, event, stage, Utc::now());
    match media
        .start_processing(&asset)
        .await
        .map_err(|e| PipelineError::store("create media document", e))?
    {
        ProcessingStart::AlreadyProcessed => {
            tracing::info!(
                media_id = %media_id,
                "Media already processed, ignoring redelivered event"
            );
            Ok(RunStart::AlreadyProcessed)
        }
        ProcessingStart::Started {
            previous_stage: Some(previous),
        } => {
            tracing::info!(
                media_id = %media_id,
                stage = %previous,
                "Restarting unfinished media processing"
            );
            Ok(RunStart::Fresh)
        }
        ProcessingStart::Started { previous_stage: None } => Ok(RunStart::Fresh),
    }
}

/// Write a progress checkpoint.
pub(crate) async fn checkpoint(
    media: &MediaAssetRepository,
    media_id: &str,
    stage: &dyn PipelineStage,
) -> Result<(), PipelineError> {
    media
        .record_stage(media_id, stage)
        .await
        .map_err(|e| PipelineError::store("record stage", e))
}
