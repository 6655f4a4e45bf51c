//! Document store boundary — collections of schemaless JSON documents.
//!
//! DESIGN
//! ======
//! Every backend keeps one revision counter per collection on a `watch`
//! channel and bumps it after each successful mutation. Live queries wait on
//! that counter and re-run the ordered query, so subscribers always receive a
//! full replacement snapshot rather than a diff. Concurrent writers are
//! last-write-wins.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::frame::{ErrorCode, now_ms};

/// Server-assigned creation timestamp, milliseconds since Unix epoch.
pub const CREATED_AT: &str = "createdAt";

pub type Fields = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: Uuid,
    pub fields: Fields,
}

impl Document {
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    #[must_use]
    pub fn created_at(&self) -> Option<i64> {
        self.get(CREATED_AT).and_then(Value::as_i64)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: Uuid },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("malformed document: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "E_NOT_FOUND",
            Self::Database(_) => "E_DATABASE",
            Self::Decode(_) => "E_DECODE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

// =============================================================================
// ORDERING
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOrder {
    pub field: String,
    pub direction: Direction,
}

impl QueryOrder {
    #[must_use]
    pub fn newest_first() -> Self {
        Self { field: CREATED_AT.to_owned(), direction: Direction::Desc }
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: by type first, numbers numerically,
/// strings lexicographically.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Order documents by `order.field`. Documents lacking the field are
/// excluded. Ties keep their existing relative order.
#[must_use]
pub fn order_documents(docs: Vec<Document>, order: &QueryOrder) -> Vec<Document> {
    let mut docs: Vec<Document> = docs
        .into_iter()
        .filter(|d| d.get(&order.field).is_some())
        .collect();
    docs.sort_by(|a, b| {
        let (Some(x), Some(y)) = (a.get(&order.field), b.get(&order.field)) else {
            return Ordering::Equal;
        };
        let ord = compare_values(x, y);
        match order.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        }
    });
    docs
}

/// Stamp a new document's fields with its creation time. Caller-supplied
/// timestamps are overwritten.
pub(crate) fn stamp_created(mut fields: Fields, now: i64) -> Fields {
    fields.insert(CREATED_AT.to_owned(), Value::from(now));
    fields
}

/// Drop keys a partial update may not touch.
pub(crate) fn strip_immutable(mut partial: Fields) -> Fields {
    partial.remove(CREATED_AT);
    partial
}

// =============================================================================
// STORE TRAIT
// =============================================================================

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document and return its id.
    async fn create(&self, collection: &str, fields: Fields) -> Result<Uuid, StoreError>;

    /// Merge `partial` into an existing document.
    async fn update(&self, collection: &str, id: Uuid, partial: Fields) -> Result<(), StoreError>;

    /// Remove a document. Removing a missing document succeeds.
    async fn delete(&self, collection: &str, id: Uuid) -> Result<(), StoreError>;

    /// Unordered snapshot of a collection.
    async fn get_all(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// Revision counter that changes after every mutation of `collection`.
    fn watch(&self, collection: &str) -> watch::Receiver<u64>;

    /// Ordered snapshot of a collection.
    async fn query(&self, collection: &str, order: &QueryOrder) -> Result<Vec<Document>, StoreError> {
        Ok(order_documents(self.get_all(collection).await?, order))
    }
}

/// Per-collection revision counters shared by every backend.
#[derive(Default)]
pub(crate) struct Revisions {
    channels: Mutex<HashMap<String, watch::Sender<u64>>>,
}

impl Revisions {
    pub(crate) fn subscribe(&self, collection: &str) -> watch::Receiver<u64> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(collection.to_owned())
            .or_insert_with(|| watch::channel(0).0)
            .subscribe()
    }

    pub(crate) fn bump(&self, collection: &str) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(collection.to_owned())
            .or_insert_with(|| watch::channel(0).0)
            .send_modify(|rev| *rev += 1);
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-process store. Used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    revisions: Revisions,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, collection: &str, fields: Fields) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        {
            let mut collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
            collections
                .entry(collection.to_owned())
                .or_default()
                .push(Document { id, fields: stamp_created(fields, now_ms()) });
        }
        self.revisions.bump(collection);
        Ok(id)
    }

    async fn update(&self, collection: &str, id: Uuid, partial: Fields) -> Result<(), StoreError> {
        {
            let mut collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
            let doc = collections
                .get_mut(collection)
                .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
                .ok_or_else(|| StoreError::NotFound { collection: collection.to_owned(), id })?;
            doc.fields.extend(strip_immutable(partial));
        }
        self.revisions.bump(collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<(), StoreError> {
        let removed = {
            let mut collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
            collections.get_mut(collection).is_some_and(|docs| {
                let before = docs.len();
                docs.retain(|d| d.id != id);
                docs.len() != before
            })
        };
        if removed {
            self.revisions.bump(collection);
        }
        Ok(())
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(collections.get(collection).cloned().unwrap_or_default())
    }

    fn watch(&self, collection: &str) -> watch::Receiver<u64> {
        self.revisions.subscribe(collection)
    }
}

// =============================================================================
// LIVE QUERY
// =============================================================================

/// Live ordered query. Yields the full snapshot on subscribe and after every
/// change. Dropping it unsubscribes.
pub struct LiveQuery {
    rx: mpsc::Receiver<Result<Vec<Document>, StoreError>>,
    task: JoinHandle<()>,
}

impl LiveQuery {
    /// Next snapshot, or `None` once the store stops publishing.
    pub async fn next(&mut self) -> Option<Result<Vec<Document>, StoreError>> {
        self.rx.recv().await
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Subscribe to an ordered query over `collection`. Must be called inside a
/// Tokio runtime.
#[must_use]
pub fn subscribe_query(store: Arc<dyn DocumentStore>, collection: &str, order: QueryOrder) -> LiveQuery {
    let (tx, rx) = mpsc::channel(1);
    let mut revisions = store.watch(collection);
    let collection = collection.to_owned();

    let task = tokio::spawn(async move {
        debug!(%collection, "live query subscribed");
        loop {
            revisions.mark_unchanged();
            let snapshot = store.query(&collection, &order).await;
            if let Err(e) = &snapshot {
                warn!(%collection, error = %e, "live query refresh failed");
            }
            if tx.send(snapshot).await.is_err() {
                break;
            }
            if revisions.changed().await.is_err() {
                break;
            }
        }
        debug!(%collection, "live query closed");
    });

    LiveQuery { rx, task }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
