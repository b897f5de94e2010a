//! In-process document store.
//!
//! Transactions hold the store lock for their whole lifetime, which gives them
//! serializable isolation. Writes are staged and only applied on commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::document::{
    DbError, DbResult, Document, DocumentStore, DocumentTransaction, Query, SetOptions,
};
use super::patch::{apply_query, apply_update, deep_merge};

type Collections = HashMap<String, BTreeMap<String, JsonValue>>;

#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    collections: Arc<Mutex<Collections>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> DbResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }

    /// Number of documents in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .await
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    /// Snapshot of every document, for before/after comparisons in tests.
    pub async fn snapshot(&self) -> Collections {
        self.collections.lock().await.clone()
    }
}

fn write(
    collections: &mut Collections,
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
    let docs = collections.entry(collection.to_string()).or_default();
    match docs.get_mut(id) {
        Some(existing) if options.merge => deep_merge(existing, data),
        _ => {
            docs.insert(id.to_string(), data);
        }
    }
    Ok(())
}

fn documents(collections: &Collections, collection: &str) -> Vec<Document> {
    collections
        .get(collection)
        .map(|docs| {
            docs.iter()
                .map(|(id, data)| Document {
                    id: id.clone(),
                    data: data.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> DbResult<Option<JsonValue>> {
        self.check_available()?;
        let collections = self.collections.lock().await;
        Ok(collections.get(collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        data: JsonValue,
        options: SetOptions,
    ) -> DbResult<()> {
        self.check_available()?;
        let mut collections = self.collections.lock().await;
        write(&mut collections, collection, id, data, options)
    }

    async fn update(&self, collection: &str, id: &str, fields: JsonValue) -> DbResult<()> {
        self.check_available()?;
        let mut collections = self.collections.lock().await;
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| DbError::not_found(collection, id))?;
        // Apply to a copy so a bad path leaves the document untouched.
        let mut updated = doc.clone();
        apply_update(&mut updated, fields)?;
        *doc = updated;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> DbResult<()> {
        self.check_available()?;
        let mut collections = self.collections.lock().await;
        if let Some(docs) = collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> DbResult<Vec<Document>> {
        self.check_available()?;
        let collections = self.collections.lock().await;
        Ok(apply_query(documents(&collections, collection), query))
    }

    async fn begin(&self) -> DbResult<Box<dyn DocumentTransaction>> {
        self.check_available()?;
        let guard = self.collections.clone().lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            guard,
            staged: Vec::new(),
            unavailable: self.unavailable.clone(),
        }))
    }
}

enum StagedWrite {
    Set {
        collection: String,
        id: String,
        data: JsonValue,
        options: SetOptions,
    },
    Delete {
        collection: String,
        id: String,
    },
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Collections>,
    staged: Vec<StagedWrite>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryTransaction {
    /// Committed state with this transaction's staged writes applied.
    fn view(&self) -> DbResult<Collections> {
        let mut view = (*self.guard).clone();
        for write_op in &self.staged {
            apply_staged(&mut view, write_op)?;
        }
        Ok(view)
    }
}

fn apply_staged(collections: &mut Collections, staged: &StagedWrite) -> DbResult<()> {
    match staged {
        StagedWrite::Set {
            collection,
            id,
            data,
            options,
        } => write(collections, collection, id, data.clone(), *options),
        StagedWrite::Delete { collection, id } => {
            if let Some(docs) = collections.get_mut(collection) {
                docs.remove(id);
            }
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentTransaction for MemoryTransaction {
    async fn get(&mut self, collection: &str, id: &str) -> DbResult<Option<JsonValue>> {
        if self.staged.is_empty() {
            return Ok(self.guard.get(collection).and_then(|docs| docs.get(id)).cloned());
        }
        let view = self.view()?;
        Ok(view.get(collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn query(&mut self, collection: &str, query: &Query) -> DbResult<Vec<Document>> {
        let view = self.view()?;
        Ok(apply_query(documents(&view, collection), query))
    }

    async fn set(
        &mut self,
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
        self.staged.push(StagedWrite::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
            options,
        });
        Ok(())
    }

    async fn delete(&mut self, collection: &str, id: &str) -> DbResult<()> {
        self.staged.push(StagedWrite::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> DbResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("memory store offline".to_string()));
        }
        let view = self.view()?;
        *self.guard = view;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::document::{DocumentStoreExt, FilterOp};
    use serde_json::json;

    #[tokio::test]
    async fn set_merge_and_update() {
        let store = MemoryDocumentStore::new();
        store
            .set("media", "a", json!({"x": {"y": 1}, "z": 1}), SetOptions::overwrite())
            .await
            .unwrap();
        store
            .set("media", "a", json!({"x": {"w": 2}}), SetOptions::merge())
            .await
            .unwrap();
        store.update("media", "a", json!({"x.y": 5})).await.unwrap();

        let doc = store.get("media", "a").await.unwrap().unwrap();
        assert_eq!(doc, json!({"x": {"y": 5, "w": 2}, "z": 1}));

        store
            .set("media", "a", json!({"fresh": true}), SetOptions::overwrite())
            .await
            .unwrap();
        assert_eq!(store.get("media", "a").await.unwrap().unwrap(), json!({"fresh": true}));
    }

    #[tokio::test]
    async fn update_missing_document_is_not_found() {
        let store = MemoryDocumentStore::new();
        let err = store.update("media", "nope", json!({"a": 1})).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn transaction_commit_and_rollback() {
        let store = MemoryDocumentStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.set("a", "1", json!({"v": 1}), SetOptions::overwrite()).await.unwrap();
        assert_eq!(tx.get("a", "1").await.unwrap(), Some(json!({"v": 1})));
        drop(tx);
        assert!(store.get("a", "1").await.unwrap().is_none());

        let mut tx = store.begin().await.unwrap();
        tx.set("a", "1", json!({"v": 1}), SetOptions::overwrite()).await.unwrap();
        tx.set("b", "2", json!({"v": 2}), SetOptions::overwrite()).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.count("a").await, 1);
        assert_eq!(store.count("b").await, 1);
    }

    #[tokio::test]
    async fn transaction_sees_its_own_deletes() {
        let store = MemoryDocumentStore::new();
        store.set("a", "1", json!({"v": 1}), SetOptions::overwrite()).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.delete("a", "1").await.unwrap();
        assert!(tx.get("a", "1").await.unwrap().is_none());
        let found = tx
            .query("a", &Query::new().filter("v", FilterOp::Eq, 1))
            .await
            .unwrap();
        assert!(found.is_empty());
        tx.commit().await.unwrap();
        assert_eq!(store.count("a").await, 0);
    }

    #[tokio::test]
    async fn unavailable_store_fails_fast() {
        let store = MemoryDocumentStore::new();
        store.set_unavailable(true);
        let err = store.get_as::<JsonValue>("a", "1").await.unwrap_err();
        assert!(err.is_transient());
    }
}
