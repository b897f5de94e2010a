//! Event handling error types
//!
//! Lets an event handler tell the consumer whether a failure is worth a redelivery
//! (transient I/O) or must be surfaced as final (malformed media, bad event).

use std::fmt;

/// Event handling error that can be either retryable or final
#[derive(Debug)]
pub struct EventError {
    inner: anyhow::Error,
    retryable: bool,
}

impl EventError {
    /// Final errors are reported once and never redelivered.
    /// Use this for codec failures and events that can never succeed.
    pub fn fatal(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            retryable: false,
        }
    }

    /// Retryable errors are redelivered by the consumer with backoff.
    /// Use this for unavailable blob or document stores.
    pub fn retryable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            retryable: true,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for EventError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for EventError {
    /// Untyped errors are assumed transient, matching at-least-once delivery.
    fn from(err: anyhow::Error) -> Self {
        Self::retryable(err)
    }
}

/// Extension trait for Result to mark errors as final
pub trait EventResultExt<T> {
    fn fatal(self) -> Result<T, EventError>;
}

impl<T, E: Into<anyhow::Error>> EventResultExt<T> for Result<T, E> {
    fn fatal(self) -> Result<T, EventError> {
        self.map_err(|e| EventError::fatal(e.into()))
    }
}
