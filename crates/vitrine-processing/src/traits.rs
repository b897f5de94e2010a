//! Codec traits
//!
//! The ingestion pipelines only talk to codecs through these traits, so tests can
//! substitute deterministic fakes for ffmpeg and the image stack.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use vitrine_core::ImageVariantSpec;

use crate::error::ProcessingResult;
use crate::metadata::{ImageVariant, VideoMetadata};

#[async_trait]
pub trait ImageCodec: Send + Sync {
    /// Produce one webp file per spec in `output_dir`, preserving aspect ratio and
    /// never upscaling. Results are returned in the order of `variants`.
    async fn resize_to_webp(
        &self,
        input: &Path,
        output_dir: &Path,
        variants: &[ImageVariantSpec],
    ) -> ProcessingResult<Vec<ImageVariant>>;

    /// Compact placeholder string for the image.
    async fn perceptual_hash(&self, input: &Path) -> ProcessingResult<String>;
}

#[async_trait]
pub trait VideoCodec: Send + Sync {
    async fn probe(&self, input: &Path) -> ProcessingResult<VideoMetadata>;

    /// Write a single JPEG frame taken `offset_secs` into the video, scaled to `width`.
    async fn extract_poster(
        &self,
        input: &Path,
        output: &Path,
        offset_secs: f64,
        width: u32,
    ) -> ProcessingResult<()>;

    /// Transcode to a webm rendition of the given height inside `output_dir`.
    async fn transcode_to_webm(
        &self,
        input: &Path,
        output_dir: &Path,
        height: u32,
    ) -> ProcessingResult<PathBuf>;
}
