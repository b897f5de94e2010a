use thiserror::Error;
use vitrine_core::EventError;
use vitrine_db::DbError;
use vitrine_processing::ProcessingError;
use vitrine_storage::StorageError;

/// Ingestion pipeline failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Blob or document store failure that may succeed on redelivery.
    #[error("{step} failed: {message}")]
    Transient { step: &'static str, message: String },

    /// The media could not be decoded, probed or encoded.
    #[error("{step} failed: {source}")]
    Codec {
        step: &'static str,
        #[source]
        source: ProcessingError,
    },

    /// The event or the stored state can never lead to a successful run.
    #[error("precondition failed: {0}")]
    Precondition(String),
}

impl PipelineError {
    pub fn storage(step: &'static str, err: StorageError) -> Self {
        if err.is_transient() {
            PipelineError::Transient {
                step,
                message: err.to_string(),
            }
        } else {
            PipelineError::Precondition(format!("{}: {}", step, err))
        }
    }

    pub fn store(step: &'static str, err: DbError) -> Self {
        if err.is_transient() {
            PipelineError::Transient {
                step,
                message: err.to_string(),
            }
        } else {
            PipelineError::Precondition(format!("{}: {}", step, err))
        }
    }

    pub fn codec(step: &'static str, source: ProcessingError) -> Self {
        PipelineError::Codec { step, source }
    }

    pub fn io(step: &'static str, err: std::io::Error) -> Self {
        PipelineError::Transient {
            step,
            message: err.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Transient { .. })
    }
}

impl From<PipelineError> for EventError {
    fn from(err: PipelineError) -> Self {
        if err.is_retryable() {
            EventError::retryable(err)
        } else {
            EventError::fatal(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_objects_are_not_retried() {
        let err = PipelineError::storage(
            "download original",
            StorageError::NotFound("uploads/images/a.jpg".into()),
        );
        assert!(matches!(err, PipelineError::Precondition(_)));
        assert!(!EventError::from(err).is_retryable());
    }

    #[test]
    fn backend_outages_are_retried() {
        let err = PipelineError::storage(
            "upload derivative",
            StorageError::BackendError("503".into()),
        );
        assert!(err.is_retryable());

        let err = PipelineError::store("record stage", DbError::Unavailable("down".into()));
        assert!(EventError::from(err).is_retryable());
    }

    #[test]
    fn codec_failures_are_final() {
        let err = PipelineError::codec("probe", ProcessingError::Probe("no stream".into()));
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("probe failed"));
    }
}
