//! `PostgreSQL` implementation of the `EventIndex` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tokio::sync::Mutex;
use uuid::Uuid;

use delayq_core::error::{QueueError, Result};
use delayq_core::event::{EventId, IndexRow, NewIndexRecord};
use delayq_core::query::{IndexQuery, Order};
use delayq_core::queue_type::QueueType;
use delayq_core::repository::EventIndex;

type PgTransaction = Transaction<'static, Postgres>;

fn infrastructure(context: &str, err: &sqlx::Error) -> QueueError {
    QueueError::Infrastructure(format!("{context}: {err}"))
}

/// PostgreSQL-backed event index session.
///
/// The first write opens a transaction on a dedicated pooled connection;
/// later reads and writes go through it until `commit` or `rollback`.
/// Dropping the session with a transaction still open rolls it back.
#[derive(Debug)]
pub struct PgEventIndex {
    pool: PgPool,
    tx: Mutex<Option<PgTransaction>>,
}

impl PgEventIndex {
    /// Creates a new `PgEventIndex` with no open transaction.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tx: Mutex::new(None),
        }
    }

    async fn open<'a>(&self, slot: &'a mut Option<PgTransaction>) -> Result<&'a mut PgTransaction> {
        if slot.is_none() {
            let tx = self
                .pool
                .begin()
                .await
                .map_err(|e| infrastructure("begin transaction", &e))?;
            *slot = Some(tx);
        }
        slot.as_mut()
            .ok_or_else(|| QueueError::Infrastructure("transaction unavailable".into()))
    }
}

fn select_query(query: &IndexQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder =
        QueryBuilder::new("SELECT uuid, event_at FROM delayed_queue WHERE queue_type = ");
    builder.push_bind(query.queue_type.value());
    if let Some(before) = query.before {
        builder.push(" AND event_at < ").push_bind(before);
    }
    if let Some(after) = query.after {
        builder.push(" AND event_at > ").push_bind(after);
    }
    builder.push(match query.order {
        Order::Asc => " ORDER BY event_at ASC, id ASC",
        Order::Desc => " ORDER BY event_at DESC, id DESC",
    });
    builder.push(" LIMIT ").push_bind(i64::from(query.limit));
    builder
}

#[async_trait]
impl EventIndex for PgEventIndex {
    async fn insert(&self, record: &NewIndexRecord) -> Result<()> {
        let mut slot = self.tx.lock().await;
        let tx = self.open(&mut slot).await?;
        sqlx::query("INSERT INTO delayed_queue (uuid, queue_type, event_at) VALUES ($1, $2, $3)")
            .bind(record.event_id.as_uuid())
            .bind(record.queue_type.value())
            .bind(record.event_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| infrastructure("insert index row", &e))?;
        Ok(())
    }

    async fn select(&self, query: &IndexQuery) -> Result<Vec<IndexRow>> {
        let mut builder = select_query(query);
        let mut slot = self.tx.lock().await;
        let rows: Vec<(Uuid, DateTime<Utc>)> = match slot.as_mut() {
            Some(tx) => {
                builder
                    .build_query_as::<(Uuid, DateTime<Utc>)>()
                    .fetch_all(&mut **tx)
                    .await
            }
            None => {
                builder
                    .build_query_as::<(Uuid, DateTime<Utc>)>()
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| infrastructure("select index rows", &e))?;

        Ok(rows
            .into_iter()
            .map(|(uuid, event_at)| IndexRow {
                event_id: EventId::from_uuid(uuid),
                event_at,
            })
            .collect())
    }

    async fn queue_type_of(&self, event_id: EventId) -> Result<Option<QueueType>> {
        let sql = "SELECT queue_type FROM delayed_queue WHERE uuid = $1";
        let mut slot = self.tx.lock().await;
        let found: Option<i16> = match slot.as_mut() {
            Some(tx) => {
                sqlx::query_scalar::<_, i16>(sql)
                    .bind(event_id.as_uuid())
                    .fetch_optional(&mut **tx)
                    .await
            }
            None => {
                sqlx::query_scalar::<_, i16>(sql)
                    .bind(event_id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
            }
        }
        .map_err(|e| infrastructure("look up index row", &e))?;
        Ok(found.map(QueueType::new))
    }

    async fn delete(&self, event_id: EventId) -> Result<bool> {
        let mut slot = self.tx.lock().await;
        let tx = self.open(&mut slot).await?;
        let deleted: Option<i64> =
            sqlx::query_scalar("DELETE FROM delayed_queue WHERE uuid = $1 RETURNING id")
                .bind(event_id.as_uuid())
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| infrastructure("delete index row", &e))?;
        Ok(deleted.is_some())
    }

    async fn commit(&self) -> Result<()> {
        if let Some(tx) = self.tx.lock().await.take() {
            tx.commit()
                .await
                .map_err(|e| infrastructure("commit transaction", &e))?;
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        if let Some(tx) = self.tx.lock().await.take() {
            tx.rollback()
                .await
                .map_err(|e| infrastructure("rollback transaction", &e))?;
        }
        Ok(())
    }
}
