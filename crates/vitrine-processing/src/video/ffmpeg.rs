use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::command::{path_arg, run, validate_executable};
use super::probe::{parse_probe_output, PROBE_ARGS};
use crate::error::{ProcessingError, ProcessingResult};
use crate::metadata::VideoMetadata;
use crate::traits::VideoCodec;

const WEBM_CRF: &str = "32";
const WEBM_AUDIO_BITRATE: &str = "128k";

/// File name of the webm rendition for a target height.
pub fn webm_file_name(height: u32) -> String {
    format!("webm_{}.webm", height)
}

/// Video codec driving the ffmpeg and ffprobe executables.
#[derive(Debug, Clone)]
pub struct FfmpegVideoCodec {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FfmpegVideoCodec {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> ProcessingResult<Self> {
        let ffmpeg_path = ffmpeg_path.into();
        let ffprobe_path = ffprobe_path.into();
        validate_executable(&ffmpeg_path)?;
        validate_executable(&ffprobe_path)?;
        Ok(Self {
            ffmpeg_path,
            ffprobe_path,
        })
    }

    fn poster_args(input: &str, output: &str, offset_secs: f64, width: u32) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-ss".to_string(),
            format!("{:.3}", offset_secs.max(0.0)),
            "-i".to_string(),
            input.to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-vf".to_string(),
            format!("scale={}:-2", width),
            "-q:v".to_string(),
            "2".to_string(),
            output.to_string(),
        ]
    }

    fn webm_args(input: &str, output: &str, height: u32) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string(),
            "-vf".to_string(),
            format!("scale=-2:{}", height),
            "-c:v".to_string(),
            "libvpx-vp9".to_string(),
            "-b:v".to_string(),
            "0".to_string(),
            "-crf".to_string(),
            WEBM_CRF.to_string(),
            "-row-mt".to_string(),
            "1".to_string(),
            "-c:a".to_string(),
            "libopus".to_string(),
            "-b:a".to_string(),
            WEBM_AUDIO_BITRATE.to_string(),
            output.to_string(),
        ]
    }
}

#[async_trait]
impl VideoCodec for FfmpegVideoCodec {
    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffprobe",
        process.executable.path = %self.ffprobe_path,
        ffmpeg.operation = "probe"
    ))]
    async fn probe(&self, input: &Path) -> ProcessingResult<VideoMetadata> {
        let mut args: Vec<String> = PROBE_ARGS.iter().map(|a| a.to_string()).collect();
        args.push(path_arg(input)?);
        let stdout = run(&self.ffprobe_path, &args, "probe").await?;
        let metadata = parse_probe_output(&stdout)?;

        tracing::info!(
            video_duration = metadata.duration,
            width = metadata.width,
            height = metadata.height,
            codec = %metadata.codec,
            "Video probe completed"
        );
        Ok(metadata)
    }

    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffmpeg",
        ffmpeg.operation = "poster"
    ))]
    async fn extract_poster(
        &self,
        input: &Path,
        output: &Path,
        offset_secs: f64,
        width: u32,
    ) -> ProcessingResult<()> {
        let input_arg = path_arg(input)?;
        let output_arg = path_arg(output)?;

        let args = Self::poster_args(&input_arg, &output_arg, offset_secs, width);
        run(&self.ffmpeg_path, &args, "poster").await?;

        // Seeking past the end of a short clip succeeds without writing a frame.
        if !tokio::fs::try_exists(output).await? && offset_secs > 0.0 {
            tracing::debug!(offset_secs, "No frame at poster offset, retrying from the start");
            let args = Self::poster_args(&input_arg, &output_arg, 0.0, width);
            run(&self.ffmpeg_path, &args, "poster").await?;
        }

        if !tokio::fs::try_exists(output).await? {
            return Err(ProcessingError::Ffmpeg {
                operation: "poster",
                stderr: "no frame was extracted".to_string(),
            });
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffmpeg",
        ffmpeg.operation = "transcode"
    ))]
    async fn transcode_to_webm(
        &self,
        input: &Path,
        output_dir: &Path,
        height: u32,
    ) -> ProcessingResult<PathBuf> {
        let start = Instant::now();
        let output: PathBuf = output_dir.join(webm_file_name(height));
        let args = Self::webm_args(&path_arg(input)?, &path_arg(&output)?, height);
        run(&self.ffmpeg_path, &args, "transcode").await?;

        tracing::info!(
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            height,
            "Webm rendition transcoded"
        );
        Ok(output)
    }
}
