//! Error types module
//!
//! Caller-facing errors for the callable operations (the work-order lifecycle).
//! Pipeline errors live next to the pipelines; this module only defines the typed,
//! displayable error every callable returns and the metadata trait used to log and
//! present it.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for rejected requests and precondition failures
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "failed-precondition")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Client-facing message
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

/// Error kinds surfaced by callable operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    Unauthenticated,
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::InvalidArgument => "invalid-argument",
            ErrorCode::NotFound => "not-found",
            ErrorCode::FailedPrecondition => "failed-precondition",
            ErrorCode::Internal => "internal",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Typed error returned by callable operations, intended for direct display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct CallableError {
    pub code: ErrorCode,
    pub message: String,
}

impl CallableError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unauthenticated() -> Self {
        Self::new(
            ErrorCode::Unauthenticated,
            "The caller must be authenticated",
        )
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::FailedPrecondition, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl ErrorMetadata for CallableError {
    fn error_code(&self) -> &'static str {
        self.code.as_str()
    }

    fn is_recoverable(&self) -> bool {
        matches!(self.code, ErrorCode::Internal)
    }

    fn client_message(&self) -> String {
        match self.code {
            // Internal details stay in the logs.
            ErrorCode::Internal => "An internal error occurred".to_string(),
            _ => self.message.clone(),
        }
    }

    fn log_level(&self) -> LogLevel {
        match self.code {
            ErrorCode::InvalidArgument | ErrorCode::Unauthenticated => LogLevel::Debug,
            ErrorCode::NotFound | ErrorCode::FailedPrecondition => LogLevel::Warn,
            ErrorCode::Internal => LogLevel::Error,
        }
    }
}
