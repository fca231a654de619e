//! `PostgreSQL` implementation of the `PayloadStore` trait.
//!
//! A collection is a table of JSONB documents keyed by event id. Each row
//! carries an `expires_at` stamped from the collection's TTL on every write;
//! expired rows are invisible to reads and removed by [`PgPayloadStore::purge_expired`].
//! The store runs on the pool directly, outside any index transaction.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::info;

use delayq_core::error::{QueueError, Result};
use delayq_core::event::EventId;
use delayq_core::repository::{PayloadStore, WriteOutcome};

use crate::schema::{
    create_payload_collection_sql, create_payload_expiry_index_sql, is_valid_collection_name,
};

/// SQLSTATE for `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

fn is_undefined_table(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNDEFINED_TABLE)
}

fn infrastructure(context: &str, err: &sqlx::Error) -> QueueError {
    QueueError::Infrastructure(format!("{context}: {err}"))
}

/// PostgreSQL-backed payload store for one collection.
#[derive(Debug, Clone)]
pub struct PgPayloadStore {
    pool: PgPool,
    collection: String,
}

impl PgPayloadStore {
    /// Creates a store over `collection`. The table is not created until
    /// `create_collection_if_missing` is called.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Validation` if `collection` is not a lowercase SQL
    /// identifier.
    pub fn new(pool: PgPool, collection: impl Into<String>) -> Result<Self> {
        let collection = collection.into();
        if !is_valid_collection_name(&collection) {
            return Err(QueueError::Validation(format!(
                "invalid payload collection name '{collection}'"
            )));
        }
        Ok(Self { pool, collection })
    }

    /// The collection (table) this store reads and writes.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Deletes expired documents and returns how many were removed. A missing
    /// collection has nothing to purge.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Infrastructure` if the delete fails.
    pub async fn purge_expired(&self) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE expires_at <= now()", self.collection);
        match sqlx::query(&sql).execute(&self.pool).await {
            Ok(done) => {
                let purged = done.rows_affected();
                if purged > 0 {
                    info!(collection = %self.collection, purged, "purged expired payloads");
                }
                Ok(purged)
            }
            Err(e) if is_undefined_table(&e) => Ok(0),
            Err(e) => Err(infrastructure("purge expired payloads", &e)),
        }
    }
}

#[async_trait]
impl PayloadStore for PgPayloadStore {
    async fn create_or_overwrite(&self, key: EventId, value: &Value) -> Result<WriteOutcome> {
        let sql = format!(
            "INSERT INTO {} (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, expires_at = DEFAULT",
            self.collection
        );
        match sqlx::query(&sql)
            .bind(key.as_uuid())
            .bind(Json(value))
            .execute(&self.pool)
            .await
        {
            Ok(_) => Ok(WriteOutcome::Written),
            Err(e) if is_undefined_table(&e) => Ok(WriteOutcome::CollectionMissing),
            Err(e) => Err(infrastructure("write payload", &e)),
        }
    }

    async fn read(&self, key: EventId) -> Result<Option<Value>> {
        let sql = format!(
            "SELECT value FROM {} WHERE key = $1 AND expires_at > now()",
            self.collection
        );
        match sqlx::query_scalar::<_, Json<Value>>(&sql)
            .bind(key.as_uuid())
            .fetch_optional(&self.pool)
            .await
        {
            Ok(value) => Ok(value.map(|Json(value)| value)),
            Err(e) if is_undefined_table(&e) => Ok(None),
            Err(e) => Err(infrastructure("read payload", &e)),
        }
    }

    async fn force_delete(&self, key: EventId) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE key = $1", self.collection);
        match sqlx::query(&sql)
            .bind(key.as_uuid())
            .execute(&self.pool)
            .await
        {
            Ok(done) => Ok(done.rows_affected() > 0),
            Err(e) if is_undefined_table(&e) => Ok(false),
            Err(e) => Err(infrastructure("delete payload", &e)),
        }
    }

    async fn create_collection_if_missing(&self, ttl: Duration) -> Result<bool> {
        let existed: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(self.collection.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| infrastructure("check payload collection", &e))?;
        if existed {
            return Ok(false);
        }

        sqlx::query(&create_payload_collection_sql(&self.collection, ttl))
            .execute(&self.pool)
            .await
            .map_err(|e| infrastructure("create payload collection", &e))?;
        sqlx::query(&create_payload_expiry_index_sql(&self.collection))
            .execute(&self.pool)
            .await
            .map_err(|e| infrastructure("index payload collection", &e))?;

        info!(collection = %self.collection, ttl_secs = ttl.as_secs(), "created payload collection");
        Ok(true)
    }
}
