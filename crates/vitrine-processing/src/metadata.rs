//! Codec output types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Container and stream metadata reported by the probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Duration in seconds as reported by the container.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub bitrate: Option<u64>,
    pub framerate: Option<f32>,
}

impl VideoMetadata {
    /// Duration rounded to the nearest whole second.
    pub fn rounded_duration(&self) -> u64 {
        if self.duration.is_finite() && self.duration > 0.0 {
            self.duration.round() as u64
        } else {
            0
        }
    }
}

/// A generated webp variant on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageVariant {
    /// Derivative key, e.g. `webp_thumb`.
    pub key: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(duration: f64) -> VideoMetadata {
        VideoMetadata {
            duration,
            width: 1920,
            height: 1080,
            codec: "h264".to_string(),
            bitrate: None,
            framerate: None,
        }
    }

    #[test]
    fn duration_rounds_to_nearest_second() {
        assert_eq!(metadata(12.4).rounded_duration(), 12);
        assert_eq!(metadata(12.5).rounded_duration(), 13);
        assert_eq!(metadata(f64::NAN).rounded_duration(), 0);
    }
}
