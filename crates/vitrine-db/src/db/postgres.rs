//! PostgreSQL-backed document store.
//!
//! Documents live in a single `documents (collection, id, data JSONB)` table.
//! Equality filters are pushed down as a `data @> $2` containment check; the
//! remaining filters, ordering and limit are evaluated on the fetched rows.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use vitrine_core::DocumentStoreConfig;

use super::document::{
    DbError, DbResult, Document, DocumentStore, DocumentTransaction, FilterOp, Query, SetOptions,
};
use super::patch::{apply_query, apply_update, deep_merge};

#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and apply pending migrations.
    pub async fn connect(config: &DocumentStoreConfig) -> anyhow::Result<Self> {
        let url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL is required for the postgres document store")?;

        tracing::info!("Connecting to database...");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(url)
            .await
            .context("Failed to connect to database")?;

        tracing::info!(
            max_connections = config.max_connections,
            "Database connected successfully"
        );

        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
        let migrator = sqlx::migrate::Migrator::new(migrations_dir)
            .await
            .context("Failed to load migrations")?;
        migrator
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;
        tracing::info!("Database migrations applied");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Nested containment document for the equality filters of a query.
fn containment(query: &Query) -> Option<JsonValue> {
    let mut root = JsonValue::Object(Map::new());
    let mut any = false;
    for filter in query.filters.iter().filter(|f| f.op == FilterOp::Eq) {
        // Numbers are compared loosely in Rust, so only push down exact types.
        if filter.value.is_number() {
            continue;
        }
        let mut fields = Map::new();
        fields.insert(filter.field.clone(), filter.value.clone());
        if apply_update(&mut root, JsonValue::Object(fields)).is_ok() {
            any = true;
        }
    }
    any.then_some(root)
}

async fn fetch_document(
    conn: &mut PgConnection,
    collection: &str,
    id: &str,
    for_update: bool,
) -> DbResult<Option<JsonValue>> {
    let sql = if for_update {
        "SELECT data FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE"
    } else {
        "SELECT data FROM documents WHERE collection = $1 AND id = $2"
    };
    let row: Option<Json<JsonValue>> = sqlx::query_scalar::<Postgres, Json<JsonValue>>(sql)
        .bind(collection)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|Json(data)| data))
}

async fn upsert_document(
    conn: &mut PgConnection,
    collection: &str,
    id: &str,
    data: &JsonValue,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO documents (collection, id, data)
        VALUES ($1, $2, $3)
        ON CONFLICT (collection, id)
        DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
        "#,
    )
    .bind(collection)
    .bind(id)
    .bind(Json(data))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn delete_document(conn: &mut PgConnection, collection: &str, id: &str) -> DbResult<()> {
    sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
        .bind(collection)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn query_documents(
    conn: &mut PgConnection,
    collection: &str,
    query: &Query,
) -> DbResult<Vec<Document>> {
    let rows: Vec<(String, Json<JsonValue>)> = match containment(query) {
        Some(filter) => {
            sqlx::query_as::<Postgres, (String, Json<JsonValue>)>(
                "SELECT id, data FROM documents WHERE collection = $1 AND data @> $2",
            )
            .bind(collection)
            .bind(Json(filter))
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_as::<Postgres, (String, Json<JsonValue>)>(
                "SELECT id, data FROM documents WHERE collection = $1",
            )
            .bind(collection)
            .fetch_all(&mut *conn)
            .await?
        }
    };

    let documents = rows
        .into_iter()
        .map(|(id, Json(data))| Document { id, data });
    Ok(apply_query(documents, query))
}

/// Read-modify-write of a single document.
async fn write_document(
    conn: &mut PgConnection,
    collection: &str,
    id: &str,
    data: JsonValue,
    options: SetOptions,
) -> DbResult<()> {
    if !data.is_object() {
        return Err(DbError::InvalidDocument(format!(
            "{}/{} must be a JSON object",
            collection, id
        )));
    }
    let merged = if options.merge {
        match fetch_document(conn, collection, id, true).await? {
            Some(mut existing) => {
                deep_merge(&mut existing, data);
                existing
            }
            None => data,
        }
    } else {
        data
    };
    upsert_document(conn, collection, id, &merged).await
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    #[tracing::instrument(skip(self), fields(db.table = "documents"))]
    async fn get(&self, collection: &str, id: &str) -> DbResult<Option<JsonValue>> {
        let mut conn = self.pool.acquire().await?;
        fetch_document(&mut conn, collection, id, false).await
    }

    #[tracing::instrument(skip(self, data), fields(db.table = "documents"))]
    async fn set(
        &self,
        collection: &str,
        id: &str,
        data: JsonValue,
        options: SetOptions,
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        write_document(&mut tx, collection, id, data, options).await?;
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, fields), fields(db.table = "documents"))]
    async fn update(&self, collection: &str, id: &str, fields: JsonValue) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let mut doc = fetch_document(&mut tx, collection, id, true)
            .await?
            .ok_or_else(|| DbError::not_found(collection, id))?;
        apply_update(&mut doc, fields)?;
        upsert_document(&mut tx, collection, id, &doc).await?;
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "documents"))]
    async fn delete(&self, collection: &str, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        delete_document(&mut conn, collection, id).await
    }

    #[tracing::instrument(skip(self, query), fields(db.table = "documents"))]
    async fn query(&self, collection: &str, query: &Query) -> DbResult<Vec<Document>> {
        let mut conn = self.pool.acquire().await?;
        query_documents(&mut conn, collection, query).await
    }

    async fn begin(&self) -> DbResult<Box<dyn DocumentTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx: Some(tx) }))
    }
}

/// Rows read inside the transaction are locked with `FOR UPDATE` until commit.
pub struct PostgresTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresTransaction {
    fn conn(&mut self) -> DbResult<&mut PgConnection> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(DbError::TransactionClosed),
        }
    }
}

#[async_trait]
impl DocumentTransaction for PostgresTransaction {
    async fn get(&mut self, collection: &str, id: &str) -> DbResult<Option<JsonValue>> {
        fetch_document(self.conn()?, collection, id, true).await
    }

    async fn query(&mut self, collection: &str, query: &Query) -> DbResult<Vec<Document>> {
        query_documents(self.conn()?, collection, query).await
    }

    async fn set(
        &mut self,
        collection: &str,
        id: &str,
        data: JsonValue,
        options: SetOptions,
    ) -> DbResult<()> {
        write_document(self.conn()?, collection, id, data, options).await
    }

    async fn delete(&mut self, collection: &str, id: &str) -> DbResult<()> {
        delete_document(self.conn()?, collection, id).await
    }

    async fn commit(mut self: Box<Self>) -> DbResult<()> {
        let tx = self.tx.take().ok_or(DbError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        if self.tx.is_some() {
            // sqlx rolls back an uncommitted transaction when it is dropped.
            tracing::debug!("Document transaction dropped without commit - rolling back");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn containment_nests_dotted_equality_filters() {
        let query = Query::new()
            .filter("sourceRequestId", FilterOp::Eq, "req1")
            .filter("origin.context", FilterOp::Eq, "gallery")
            .filter("progress", FilterOp::Eq, 100)
            .filter("status", FilterOp::NotEq, "completed");
        assert_eq!(
            containment(&query),
            Some(json!({"sourceRequestId": "req1", "origin": {"context": "gallery"}}))
        );
    }

    #[test]
    fn no_containment_without_equality_filters() {
        let query = Query::new().filter("n", FilterOp::Gt, 1);
        assert_eq!(containment(&query), None);
    }
}
