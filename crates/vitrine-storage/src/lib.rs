//! Vitrine Storage Library
//!
//! This crate provides the blob store abstraction used by the ingestion pipelines,
//! with local filesystem, in-memory and S3 implementations.
//!
//! # Key format
//!
//! Uploads arrive under `uploads/images/...` and `uploads/videos/...`. Derivatives are
//! written under `media/{media_id}/{variant}.{ext}`; see the `keys` module.
//!
//! Keys must not contain `..` or a leading `/`.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
mod tokens;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{BlobMetadata, BlobStore, StorageError, StorageResult};
pub use vitrine_core::StorageBackend;
