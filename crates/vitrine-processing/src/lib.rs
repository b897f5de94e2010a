//! Media codecs for the ingestion pipelines
//!
//! Image variants are produced in-process; video work shells out to ffmpeg.

pub mod error;
pub mod metadata;
pub mod traits;

#[cfg(feature = "image")]
pub mod image;

#[cfg(feature = "video")]
pub mod video;

pub use error::{ProcessingError, ProcessingResult};
pub use metadata::{ImageVariant, VideoMetadata};
pub use traits::{ImageCodec, VideoCodec};

#[cfg(feature = "image")]
pub use self::image::{ImageResize, StretchMode, WebpImageCodec};

#[cfg(feature = "video")]
pub use self::video::{parse_probe_output, FfmpegVideoCodec};
