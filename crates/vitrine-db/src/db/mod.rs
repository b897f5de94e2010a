//! Document store backends and repositories
//!
//! `document` defines the store traits, `memory` and `postgres` implement them, and
//! `media` wraps a store with typed access to the `media` collection.

pub mod document;
pub mod media;
pub mod memory;
pub mod patch;
pub mod postgres;

use std::sync::Arc;

use vitrine_core::{DocumentBackend, DocumentStoreConfig};

pub use document::{
    DbError, DbResult, Direction, Document, DocumentStore, DocumentStoreExt, DocumentTransaction,
    DocumentTransactionExt, Filter, FilterOp, Query, SetOptions,
};
pub use media::{MediaAssetRepository, ProcessingStart};
pub use memory::MemoryDocumentStore;
pub use postgres::PostgresDocumentStore;

/// Create the configured document store backend
pub async fn create_document_store(
    config: &DocumentStoreConfig,
) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match config.backend {
        DocumentBackend::Memory => Ok(Arc::new(MemoryDocumentStore::new())),
        DocumentBackend::Postgres => Ok(Arc::new(PostgresDocumentStore::connect(config).await?)),
    }
}
