//! The contract between the consumer and application event handlers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use delayq_core::error::QueueError;
use delayq_core::event::EventId;
use delayq_core::queue_type::QueueType;
use serde_json::{Map, Value};
use thiserror::Error;

/// Error type returned by handlers and rollbacks.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// An event that has been claimed by this consumer.
///
/// Its index row is already deleted and its payload already force-deleted;
/// this value is the only remaining copy.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedEvent {
    /// Identifier the event was stored under.
    pub event_id: EventId,
    /// Queue the event was consumed from.
    pub queue_type: QueueType,
    /// When the event was scheduled to fire.
    pub event_at: DateTime<Utc>,
    /// The payload attached by the producer.
    pub payload: Value,
}

/// Scratch space shared by `handle` and `rollback` for one event.
///
/// Starts empty for every event. A handler can record how far it got so that
/// the rollback knows how much to undo.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerContext {
    values: Map<String, Value>,
}

impl HandlerContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Removes and returns the value stored under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Application logic invoked for each claimed event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Processes a claimed event. Returning an error or panicking triggers
    /// `rollback` followed by a requeue of the event under a new identifier.
    async fn handle(
        &self,
        event: &ClaimedEvent,
        context: &mut HandlerContext,
    ) -> Result<(), HandlerError>;

    /// Undoes whatever `handle` managed to do before it failed. Receives the
    /// same context `handle` wrote to.
    ///
    /// Must not fail: if it does, the event is not requeued and is lost.
    async fn rollback(
        &self,
        _event: &ClaimedEvent,
        _context: &mut HandlerContext,
    ) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Errors surfaced by `consume_events`.
#[derive(Debug, Error)]
pub enum ConsumeError {
    /// A store operation failed outside of any handler.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The handler failed; the rollback ran and the event was requeued.
    #[error("handler failed for event {event_id} (requeued as {requeued_as}): {source}")]
    Handler {
        /// Identifier the failed event was claimed under.
        event_id: EventId,
        /// Identifier the event was requeued under.
        requeued_as: EventId,
        /// The handler's error.
        #[source]
        source: HandlerError,
    },

    /// The handler failed and so did the rollback. The event is lost.
    #[error("rollback failed for event {event_id}, event lost: {source}")]
    Rollback {
        /// Identifier of the lost event.
        event_id: EventId,
        /// The handler's error that triggered the rollback.
        handler_error: HandlerError,
        /// The rollback's error.
        #[source]
        source: HandlerError,
    },

    /// The rollback succeeded but storing the event again failed. The event
    /// is lost.
    #[error("requeue failed for event {event_id}, event lost: {source}")]
    Requeue {
        /// Identifier of the lost event.
        event_id: EventId,
        /// The handler's error that triggered the rollback.
        handler_error: HandlerError,
        /// The store error.
        #[source]
        source: QueueError,
    },
}

/// Counts from one `consume_events` call that ran to completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeReport {
    /// Due events returned by the select step.
    pub selected: usize,
    /// Events claimed and handled successfully.
    pub processed: usize,
    /// Events another consumer claimed first.
    pub skipped: usize,
}
