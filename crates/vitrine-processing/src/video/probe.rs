use serde_json::Value as JsonValue;

use crate::error::{ProcessingError, ProcessingResult};
use crate::metadata::VideoMetadata;

/// Arguments for a JSON probe of the first video stream.
pub(crate) const PROBE_ARGS: [&str; 8] = [
    "-v",
    "quiet",
    "-print_format",
    "json",
    "-show_format",
    "-show_streams",
    "-select_streams",
    "v:0",
];

fn parse_framerate(rate: &str) -> Option<f32> {
    let (num, den) = rate.split_once('/')?;
    let num: f32 = num.parse().ok()?;
    let den: f32 = den.parse().ok()?;
    (den != 0.0).then(|| num / den)
}

/// Parse ffprobe's JSON output.
///
/// ffprobe reports `duration` and `bit_rate` as strings. A missing container
/// duration falls back to the stream duration.
pub fn parse_probe_output(stdout: &[u8]) -> ProcessingResult<VideoMetadata> {
    let probe: JsonValue = serde_json::from_slice(stdout)
        .map_err(|e| ProcessingError::Probe(format!("unreadable probe output: {}", e)))?;

    let stream = probe["streams"]
        .get(0)
        .ok_or_else(|| ProcessingError::Probe("no video stream found".to_string()))?;
    let format = &probe["format"];

    let duration = format["duration"]
        .as_str()
        .or_else(|| stream["duration"].as_str())
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| ProcessingError::Probe("could not parse duration".to_string()))?;

    let width = stream["width"]
        .as_u64()
        .ok_or_else(|| ProcessingError::Probe("could not parse width".to_string()))? as u32;
    let height = stream["height"]
        .as_u64()
        .ok_or_else(|| ProcessingError::Probe("could not parse height".to_string()))? as u32;

    let codec = stream["codec_name"]
        .as_str()
        .unwrap_or("unknown")
        .to_string();

    let bitrate = format["bit_rate"]
        .as_str()
        .and_then(|b| b.parse::<u64>().ok());

    let framerate = stream["r_frame_rate"].as_str().and_then(parse_framerate);

    Ok(VideoMetadata {
        duration,
        width,
        height,
        codec,
        bitrate,
        framerate,
    })
}
