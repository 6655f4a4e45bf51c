//! Postgres-backed document store.
//!
//! SYSTEM CONTEXT
//! ==============
//! All collections share one `documents` table with a JSONB `fields`
//! column. Every mutation bumps the local revision counter and then
//! `pg_notify`s the collection name, so instances sharing the database see
//! each other's writes through their change listener.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgListener;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::frame::now_ms;
use crate::services::store::{Document, DocumentStore, Fields, Revisions, StoreError, stamp_created, strip_immutable};

/// Notification channel carrying the name of a mutated collection.
pub const CHANGE_CHANNEL: &str = "portal_documents";

const LISTENER_RETRY: Duration = Duration::from_secs(2);

pub struct PgDocumentStore {
    pool: PgPool,
    revisions: Arc<Revisions>,
}

impl PgDocumentStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool, revisions: Arc::new(Revisions::default()) }
    }

    async fn notify(&self, collection: &str) {
        self.revisions.bump(collection);
        if let Err(e) = sqlx::query("SELECT pg_notify($1, $2)")
            .bind(CHANGE_CHANNEL)
            .bind(collection)
            .execute(&self.pool)
            .await
        {
            warn!(%collection, error = %e, "change notification failed; peers will miss this write");
        }
    }

    /// Spawn the change listener. Reconnects until the task is aborted.
    #[must_use]
    pub fn spawn_listener(&self) -> JoinHandle<()> {
        let pool = self.pool.clone();
        let revisions = self.revisions.clone();
        tokio::spawn(async move {
            loop {
                let mut listener = match PgListener::connect_with(&pool).await {
                    Ok(listener) => listener,
                    Err(e) => {
                        warn!(error = %e, "change listener connect failed");
                        tokio::time::sleep(LISTENER_RETRY).await;
                        continue;
                    }
                };
                if let Err(e) = listener.listen(CHANGE_CHANNEL).await {
                    warn!(error = %e, "change listener subscribe failed");
                    tokio::time::sleep(LISTENER_RETRY).await;
                    continue;
                }
                info!(channel = CHANGE_CHANNEL, "change listener ready");

                loop {
                    match listener.recv().await {
                        Ok(notification) => revisions.bump(notification.payload()),
                        Err(e) => {
                            warn!(error = %e, "change listener dropped; reconnecting");
                            break;
                        }
                    }
                }
                tokio::time::sleep(LISTENER_RETRY).await;
            }
        })
    }
}

fn row_to_document(row: &sqlx::postgres::PgRow) -> Result<Document, StoreError> {
    let id: Uuid = row.try_get("id")?;
    let Json(fields): Json<Fields> = row.try_get("fields")?;
    Ok(Document { id, fields })
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn create(&self, collection: &str, fields: Fields) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let now = now_ms();
        sqlx::query("INSERT INTO documents (collection, id, fields, created_at) VALUES ($1, $2, $3, $4)")
            .bind(collection)
            .bind(id)
            .bind(Json(Value::Object(stamp_created(fields, now))))
            .bind(now)
            .execute(&self.pool)
            .await?;
        self.notify(collection).await;
        Ok(id)
    }

    async fn update(&self, collection: &str, id: Uuid, partial: Fields) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE documents SET fields = fields || $3 WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .bind(Json(Value::Object(strip_immutable(partial))))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { collection: collection.to_owned(), id });
        }
        self.notify(collection).await;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            self.notify(collection).await;
        }
        Ok(())
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query("SELECT id, fields FROM documents WHERE collection = $1 ORDER BY created_at, id")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_document).collect()
    }

    fn watch(&self, collection: &str) -> watch::Receiver<u64> {
        self.revisions.subscribe(collection)
    }
}

#[cfg(test)]
#[path = "pg_store_test.rs"]
mod tests;
