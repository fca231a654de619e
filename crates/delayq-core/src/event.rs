//! Event identifiers and the records exchanged with the two stores.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::queue_type::QueueType;

/// Opaque identifier of a scheduled event.
///
/// Generated by the engine when the event is stored, never by either store.
/// It is the join key between the event index and the payload store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID, e.g. one read back from storage.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A row to be inserted into the event index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIndexRecord {
    /// Event identifier (join key to the payload store).
    pub event_id: EventId,
    /// Logical partition of the shared index table.
    pub queue_type: QueueType,
    /// When the event becomes due.
    pub event_at: DateTime<Utc>,
}

/// A row returned by an index range query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRow {
    /// Event identifier.
    pub event_id: EventId,
    /// When the event becomes due.
    pub event_at: DateTime<Utc>,
}

/// An index row joined with its payload.
///
/// A `payload` of `None` marks an integrity failure: the index row exists but
/// the payload store no longer has a document for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedEvent {
    /// Event identifier.
    pub event_id: EventId,
    /// When the event becomes due.
    pub event_at: DateTime<Utc>,
    /// The stored payload, or `None` if it has been lost.
    pub payload: Option<serde_json::Value>,
}

impl IndexedEvent {
    /// Returns true if the payload for this index row is missing.
    #[must_use]
    pub fn is_integrity_failure(&self) -> bool {
        self.payload.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(EventId::generate(), EventId::generate());
    }

    #[test]
    fn test_event_id_parses_its_display_form() {
        let id = EventId::generate();
        let parsed: EventId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_event_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<EventId>().is_err());
    }

    #[test]
    fn test_event_id_serializes_as_plain_string() {
        let id = EventId::generate();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));
    }
}
