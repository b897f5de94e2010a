//! Video probing, poster extraction and webm transcoding through ffmpeg

mod command;
pub mod ffmpeg;
pub mod probe;

pub use ffmpeg::FfmpegVideoCodec;
pub use probe::parse_probe_output;
