//! The queue engine: writes and reads across the event index and the
//! payload store.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use delayq_core::clock::Clock;
use delayq_core::error::{QueueError, Result};
use delayq_core::event::{EventId, IndexedEvent, NewIndexRecord};
use delayq_core::query::{IndexQuery, IntegrityFailurePolicy};
use delayq_core::queue_type::{QueueType, QueueTypeRegistry};
use delayq_core::repository::{EventIndex, PayloadStore, WriteOutcome};
use serde_json::Value;
use tracing::{debug, info, warn};

/// TTL the payload collection is provisioned with (366 days).
///
/// Only a backstop for leaked payloads; claimed events delete their payload
/// explicitly.
pub const DEFAULT_PAYLOAD_TTL: Duration = Duration::from_secs(31_622_400);

/// Orchestrates the event index and the payload store.
///
/// The index session and the payload store are shared by every call made
/// through one engine, so an engine should not be used from several tasks
/// that expect independent transactions.
#[derive(Clone)]
pub struct QueueEngine {
    index: Arc<dyn EventIndex>,
    payloads: Arc<dyn PayloadStore>,
    clock: Arc<dyn Clock>,
    registry: QueueTypeRegistry,
    payload_ttl: Duration,
}

impl fmt::Debug for QueueEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueEngine")
            .field("registry", &self.registry)
            .field("payload_ttl", &self.payload_ttl)
            .finish_non_exhaustive()
    }
}

impl QueueEngine {
    /// Creates an engine over the given stores.
    #[must_use]
    pub fn new(
        index: Arc<dyn EventIndex>,
        payloads: Arc<dyn PayloadStore>,
        clock: Arc<dyn Clock>,
        registry: QueueTypeRegistry,
    ) -> Self {
        Self {
            index,
            payloads,
            clock,
            registry,
            payload_ttl: DEFAULT_PAYLOAD_TTL,
        }
    }

    /// Overrides the TTL used when the payload collection must be provisioned.
    #[must_use]
    pub fn with_payload_ttl(mut self, ttl: Duration) -> Self {
        self.payload_ttl = ttl;
        self
    }

    /// The queue types this engine accepts.
    #[must_use]
    pub fn registry(&self) -> &QueueTypeRegistry {
        &self.registry
    }

    /// The engine's notion of "now".
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Schedules `payload` to fire at `event_at` on `queue_type` and returns
    /// the identifier generated for it.
    ///
    /// The payload is written first, then the index row. If `commit` is false
    /// the index row stays pending in the index session's transaction.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::UnknownQueueType` for an unregistered queue type,
    /// `QueueError::CollectionUnavailable` if the payload collection is still
    /// missing after provisioning it, and `QueueError::Infrastructure` if
    /// either store fails.
    pub async fn store_event(
        &self,
        queue_type: QueueType,
        event_at: DateTime<Utc>,
        payload: &Value,
        commit: bool,
    ) -> Result<EventId> {
        self.registry.ensure(queue_type)?;
        let event_id = EventId::generate();

        self.write_payload(event_id, payload).await?;

        self.index
            .insert(&NewIndexRecord {
                event_id,
                queue_type,
                event_at,
            })
            .await?;
        if commit {
            self.index.commit().await?;
        }

        debug!(%event_id, %queue_type, %event_at, commit, "stored event");
        Ok(event_id)
    }

    async fn write_payload(&self, event_id: EventId, payload: &Value) -> Result<()> {
        if self.payloads.create_or_overwrite(event_id, payload).await? == WriteOutcome::Written {
            return Ok(());
        }

        let created = self
            .payloads
            .create_collection_if_missing(self.payload_ttl)
            .await?;
        info!(
            created,
            ttl_secs = self.payload_ttl.as_secs(),
            "payload collection was missing; provisioned it"
        );

        match self.payloads.create_or_overwrite(event_id, payload).await? {
            WriteOutcome::Written => Ok(()),
            WriteOutcome::CollectionMissing => Err(QueueError::CollectionUnavailable(format!(
                "still missing after provisioning while storing event {event_id}"
            ))),
        }
    }

    /// Returns up to `query.limit` events matching `query`, joined with their
    /// payloads. Performs no claiming.
    ///
    /// Index rows whose payload is gone are handled per `policy`:
    /// `Include` returns them with `payload: None`; `DeleteAndCommit` deletes
    /// them, commits once before returning, and leaves them out, so fewer
    /// than `limit` events may come back.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::UnknownQueueType` for an unregistered queue type
    /// and `QueueError::Infrastructure` if either store fails.
    pub async fn index_events(
        &self,
        query: &IndexQuery,
        policy: IntegrityFailurePolicy,
    ) -> Result<Vec<IndexedEvent>> {
        self.registry.ensure(query.queue_type)?;

        let rows = self.index.select(query).await?;
        let mut events = Vec::with_capacity(rows.len());
        let mut removed = 0_usize;

        for row in rows {
            let payload = self.payloads.read(row.event_id).await?;
            if payload.is_none() {
                match policy {
                    IntegrityFailurePolicy::Include => {}
                    IntegrityFailurePolicy::DeleteAndCommit => {
                        warn!(event_id = %row.event_id, "payload missing for indexed event; deleting it");
                        self.index.delete(row.event_id).await?;
                        removed += 1;
                        continue;
                    }
                }
            }
            events.push(IndexedEvent {
                event_id: row.event_id,
                event_at: row.event_at,
                payload,
            });
        }

        if removed > 0 {
            self.index.commit().await?;
        }

        Ok(events)
    }

    /// Deletes the event's index row and reports whether it existed, then
    /// force-deletes its payload.
    ///
    /// The payload deletion is immediate and irreversible no matter what
    /// later happens to the index transaction. Until `commit` is true (or the
    /// caller commits the index session), other consumers can still claim the
    /// event.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Infrastructure` if either store fails.
    pub async fn delete_event(&self, event_id: EventId, commit: bool) -> Result<bool> {
        let existed = self.index.delete(event_id).await?;
        if commit {
            self.index.commit().await?;
        }

        self.payloads.force_delete(event_id).await?;
        Ok(existed)
    }

    /// Like [`QueueEngine::delete_event`], but only for an event of
    /// `queue_type`. An event indexed under another queue type is left alone,
    /// payload included, and reported as not existing.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::UnknownQueueType` for an unregistered queue type
    /// and `QueueError::Infrastructure` if either store fails.
    pub async fn delete_queued_event(
        &self,
        queue_type: QueueType,
        event_id: EventId,
        commit: bool,
    ) -> Result<bool> {
        self.registry.ensure(queue_type)?;
        if let Some(owner) = self.index.queue_type_of(event_id).await? {
            if owner != queue_type {
                debug!(%event_id, %queue_type, %owner, "event belongs to another queue type");
                return Ok(false);
            }
        }
        self.delete_event(event_id, commit).await
    }
}
