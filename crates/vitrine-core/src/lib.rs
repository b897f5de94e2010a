//! Vitrine Core Library
//!
//! This crate provides the domain models, error types, configuration and constants
//! shared by every Vitrine component: the ingestion pipelines, the storage and
//! document-store adapters, the worker and the CLI.

pub mod config;
pub mod constants;
pub mod error;
pub mod event_error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{
    Config, DocumentBackend, DocumentStoreConfig, ImageVariantSpec, IngestConfig,
    StorageConfig, WorkerConfig,
};
pub use error::{CallableError, ErrorCode, ErrorMetadata, LogLevel};
pub use event_error::{EventError, EventResultExt};
pub use storage_types::StorageBackend;
