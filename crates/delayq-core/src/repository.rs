//! Store contracts: the ordered event index and the TTL payload store.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::event::{EventId, IndexRow, NewIndexRecord};
use crate::query::IndexQuery;
use crate::queue_type::QueueType;

/// Outcome of a payload write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The document was created or overwritten.
    Written,
    /// The backing collection does not exist yet; nothing was written.
    CollectionMissing,
}

/// Key-value document store with per-collection TTL.
///
/// Entries older than the collection's TTL expire on their own. The store is
/// not transactional with the event index.
#[async_trait]
pub trait PayloadStore: Send + Sync {
    /// Creates or replaces the document stored under `key`.
    async fn create_or_overwrite(&self, key: EventId, value: &Value) -> Result<WriteOutcome>;

    /// Reads the document stored under `key`, if any.
    async fn read(&self, key: EventId) -> Result<Option<Value>>;

    /// Deletes the document stored under `key`. Returns true if it existed.
    /// A missing collection counts as "did not exist".
    async fn force_delete(&self, key: EventId) -> Result<bool>;

    /// Provisions the collection with the given TTL. Returns true if it was
    /// created by this call.
    async fn create_collection_if_missing(&self, ttl: Duration) -> Result<bool>;
}

/// Ordered, transactional index of live events.
///
/// An implementation is a session bound to one relational connection. Writes
/// accumulate in an open transaction until `commit`; reads issued while a
/// transaction is open observe its pending writes.
#[async_trait]
pub trait EventIndex: Send + Sync {
    /// Inserts a row. Pending until `commit`.
    async fn insert(&self, record: &NewIndexRecord) -> Result<()>;

    /// Returns up to `query.limit` rows matching the query, sorted on `event_at`.
    async fn select(&self, query: &IndexQuery) -> Result<Vec<IndexRow>>;

    /// Returns the queue type the row for `event_id` belongs to, if the row
    /// exists.
    async fn queue_type_of(&self, event_id: EventId) -> Result<Option<QueueType>>;

    /// Deletes the row for `event_id` and reports whether one existed.
    ///
    /// At most one caller observes `true` for a given identifier once the
    /// deleting transactions commit; this is the claim primitive.
    async fn delete(&self, event_id: EventId) -> Result<bool>;

    /// Commits pending writes. A no-op when nothing is pending.
    async fn commit(&self) -> Result<()>;

    /// Discards pending writes. A no-op when nothing is pending.
    async fn rollback(&self) -> Result<()>;
}
