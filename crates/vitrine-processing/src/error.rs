//! Codec error types

use thiserror::Error;

/// Errors raised by the image and video codecs.
///
/// All of them mean the media itself (or the codec toolchain) is at fault, so a
/// retry of the same input is not expected to succeed.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Failed to decode media: {0}")]
    Decode(String),

    #[error("Failed to encode {format}: {message}")]
    Encode { format: &'static str, message: String },

    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("{operation} failed: {stderr}")]
    Ffmpeg { operation: &'static str, stderr: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Codec task aborted: {0}")]
    TaskAborted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for codec operations
pub type ProcessingResult<T> = Result<T, ProcessingError>;
