//! Webp variant encoder backed by the `image`, `webp` and `blurhash` crates

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, ImageReader};
use std::path::{Path, PathBuf};
use std::time::Instant;
use vitrine_core::ImageVariantSpec;

use super::resize::{ImageResize, StretchMode};
use crate::error::{ProcessingError, ProcessingResult};
use crate::metadata::ImageVariant;
use crate::traits::ImageCodec;

const BLURHASH_COMPONENTS_X: u32 = 4;
const BLURHASH_COMPONENTS_Y: u32 = 3;
const BLURHASH_SAMPLE_SIZE: u32 = 64;

/// CPU-bound work runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct WebpImageCodec {
    quality: f32,
}

impl WebpImageCodec {
    pub fn new(quality: f32) -> Self {
        Self {
            quality: quality.clamp(0.0, 100.0),
        }
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }
}

fn decode(input: &Path) -> ProcessingResult<DynamicImage> {
    ImageReader::open(input)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| ProcessingError::Decode(e.to_string()))
}

fn encode_webp(img: &DynamicImage, quality: f32) -> Vec<u8> {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let encoder = webp::Encoder::from_rgba(rgba.as_raw(), width, height);
    encoder.encode(quality).to_vec()
}

fn write_variants(
    input: &Path,
    output_dir: &Path,
    variants: &[ImageVariantSpec],
    quality: f32,
) -> ProcessingResult<Vec<ImageVariant>> {
    let img = decode(input)?;
    let mut written = Vec::with_capacity(variants.len());

    for spec in variants {
        let resized = ImageResize::resize_to_width(&img, spec.width, StretchMode::Off);
        let (width, height) = resized.dimensions();
        let encoded = encode_webp(&resized, quality);
        if encoded.is_empty() {
            return Err(ProcessingError::Encode {
                format: "webp",
                message: format!("encoder produced no output for {}", spec.name),
            });
        }

        let key = spec.key();
        let path: PathBuf = output_dir.join(format!("{}.webp", key));
        std::fs::write(&path, &encoded)?;
        written.push(ImageVariant {
            key,
            path,
            width,
            height,
        });
    }

    Ok(written)
}

fn blurhash_of(input: &Path) -> ProcessingResult<String> {
    let img = decode(input)?;
    let sample = img.resize(
        BLURHASH_SAMPLE_SIZE,
        BLURHASH_SAMPLE_SIZE,
        image::imageops::FilterType::Triangle,
    );
    let rgba = sample.to_rgba8();
    let (width, height) = rgba.dimensions();
    blurhash::encode(
        BLURHASH_COMPONENTS_X,
        BLURHASH_COMPONENTS_Y,
        width,
        height,
        rgba.as_raw(),
    )
    .map_err(|e| ProcessingError::Encode {
        format: "blurhash",
        message: format!("{:?}", e),
    })
}

#[async_trait]
impl ImageCodec for WebpImageCodec {
    #[tracing::instrument(skip(self, variants), fields(variant_count = variants.len()))]
    async fn resize_to_webp(
        &self,
        input: &Path,
        output_dir: &Path,
        variants: &[ImageVariantSpec],
    ) -> ProcessingResult<Vec<ImageVariant>> {
        let start = Instant::now();
        let input = input.to_path_buf();
        let output_dir = output_dir.to_path_buf();
        let variants = variants.to_vec();
        let quality = self.quality;

        let written = tokio::task::spawn_blocking(move || {
            write_variants(&input, &output_dir, &variants, quality)
        })
        .await
        .map_err(|e| ProcessingError::TaskAborted(e.to_string()))??;

        tracing::info!(
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            variants = written.len(),
            quality = quality,
            "Webp variants encoded"
        );
        Ok(written)
    }

    async fn perceptual_hash(&self, input: &Path) -> ProcessingResult<String> {
        let input = input.to_path_buf();
        tokio::task::spawn_blocking(move || blurhash_of(&input))
            .await
            .map_err(|e| ProcessingError::TaskAborted(e.to_string()))?
    }
}
