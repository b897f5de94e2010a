//! Document store abstraction
//!
//! A collection store of JSON documents keyed by string ids, with merge writes,
//! field updates, simple filtered queries and transactions.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Document store errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Transaction already finished")]
    TransactionClosed,
}

impl DbError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        DbError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    /// Whether retrying the same call later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Database(_) | DbError::Unavailable(_))
    }
}

/// Result type for document store operations
pub type DbResult<T> = Result<T, DbError>;

/// Options for [`DocumentStore::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Deep-merge into the existing document instead of replacing it.
    pub merge: bool,
}

impl SetOptions {
    pub fn overwrite() -> Self {
        Self { merge: false }
    }

    pub fn merge() -> Self {
        Self { merge: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Dotted field path, e.g. `processing.stage`.
    pub field: String,
    pub op: FilterOp,
    pub value: JsonValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Filters are combined with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<JsonValue>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A stored document and its id.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: JsonValue,
}

/// Document store abstraction trait
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> DbResult<Option<JsonValue>>;

    /// Create or replace a document; with `merge` the document is deep-merged.
    async fn set(
        &self,
        collection: &str,
        id: &str,
        data: JsonValue,
        options: SetOptions,
    ) -> DbResult<()>;

    /// Update fields of an existing document. Keys may be dotted paths; each named
    /// field is replaced. Fails with `NotFound` when the document does not exist.
    async fn update(&self, collection: &str, id: &str, fields: JsonValue) -> DbResult<()>;

    async fn delete(&self, collection: &str, id: &str) -> DbResult<()>;

    async fn query(&self, collection: &str, query: &Query) -> DbResult<Vec<Document>>;

    /// Start a transaction. Dropping it without `commit` discards its writes.
    async fn begin(&self) -> DbResult<Box<dyn DocumentTransaction>>;
}

/// Writes are only visible to other readers after `commit`.
#[async_trait]
pub trait DocumentTransaction: Send {
    async fn get(&mut self, collection: &str, id: &str) -> DbResult<Option<JsonValue>>;

    async fn query(&mut self, collection: &str, query: &Query) -> DbResult<Vec<Document>>;

    async fn set(
        &mut self,
        collection: &str,
        id: &str,
        data: JsonValue,
        options: SetOptions,
    ) -> DbResult<()>;

    async fn delete(&mut self, collection: &str, id: &str) -> DbResult<()>;

    async fn commit(self: Box<Self>) -> DbResult<()>;
}

/// Typed helpers over [`DocumentStore`].
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    async fn get_as<T: DeserializeOwned + Send>(
        &self,
        collection: &str,
        id: &str,
    ) -> DbResult<Option<T>> {
        match self.get(collection, id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn set_as<T: Serialize + Sync>(
        &self,
        collection: &str,
        id: &str,
        data: &T,
        options: SetOptions,
    ) -> DbResult<()> {
        let value = serde_json::to_value(data)?;
        self.set(collection, id, value, options).await
    }
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}

/// Typed helpers over [`DocumentTransaction`].
#[async_trait]
pub trait DocumentTransactionExt: DocumentTransaction {
    async fn get_as<T: DeserializeOwned + Send>(
        &mut self,
        collection: &str,
        id: &str,
    ) -> DbResult<Option<T>> {
        match self.get(collection, id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn set_as<T: Serialize + Sync>(
        &mut self,
        collection: &str,
        id: &str,
        data: &T,
        options: SetOptions,
    ) -> DbResult<()> {
        let value = serde_json::to_value(data)?;
        self.set(collection, id, value, options).await
    }
}

impl<T: DocumentTransaction + ?Sized> DocumentTransactionExt for T {}
