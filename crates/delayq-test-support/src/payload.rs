//! In-memory `PayloadStore` implementations for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use delayq_core::error::{QueueError, Result};
use delayq_core::event::EventId;
use delayq_core::repository::{PayloadStore, WriteOutcome};
use serde_json::Value;

#[derive(Debug, Default)]
struct Collection {
    ttl: Option<Duration>,
    documents: HashMap<EventId, Value>,
}

#[derive(Debug, Default)]
struct State {
    collection: Option<Collection>,
    provisioning_disabled: bool,
    provision_calls: usize,
    write_attempts: usize,
}

/// An in-memory payload store. Clones share the same documents.
///
/// TTL expiry is not simulated; use [`InMemoryPayloadStore::remove`] to make
/// a payload disappear as if it had expired.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPayloadStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryPayloadStore {
    /// Creates a store whose collection already exists.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn new() -> Self {
        let store = Self::default();
        store.state.lock().unwrap().collection = Some(Collection::default());
        store
    }

    /// Creates a store whose collection has not been provisioned yet.
    #[must_use]
    pub fn without_collection() -> Self {
        Self::default()
    }

    /// Creates a store whose collection is missing and cannot be provisioned:
    /// `create_collection_if_missing` reports success but nothing appears.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn unprovisionable() -> Self {
        let store = Self::default();
        store.state.lock().unwrap().provisioning_disabled = true;
        store
    }

    /// Drops the collection and everything in it, and stops it from being
    /// provisioned again. Later writes report a missing collection.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn drop_collection(&self) {
        let mut state = self.state.lock().unwrap();
        state.collection = None;
        state.provisioning_disabled = true;
    }

    /// Removes a document without going through the trait, simulating TTL
    /// expiry or data loss. Returns true if it existed.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn remove(&self, key: EventId) -> bool {
        self.state
            .lock()
            .unwrap()
            .collection
            .as_mut()
            .is_some_and(|c| c.documents.remove(&key).is_some())
    }

    /// Returns the document stored under `key`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn get(&self, key: EventId) -> Option<Value> {
        self.state
            .lock()
            .unwrap()
            .collection
            .as_ref()
            .and_then(|c| c.documents.get(&key).cloned())
    }

    /// Number of stored documents.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .collection
            .as_ref()
            .map_or(0, |c| c.documents.len())
    }

    /// Returns true if no documents are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// TTL the collection was provisioned with, if it was provisioned
    /// through `create_collection_if_missing`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn collection_ttl(&self) -> Option<Duration> {
        self.state
            .lock()
            .unwrap()
            .collection
            .as_ref()
            .and_then(|c| c.ttl)
    }

    /// Number of `create_collection_if_missing` calls.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn provision_calls(&self) -> usize {
        self.state.lock().unwrap().provision_calls
    }

    /// Number of `create_or_overwrite` calls, successful or not.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn write_attempts(&self) -> usize {
        self.state.lock().unwrap().write_attempts
    }
}

#[async_trait]
impl PayloadStore for InMemoryPayloadStore {
    async fn create_or_overwrite(&self, key: EventId, value: &Value) -> Result<WriteOutcome> {
        let mut state = self.state.lock().unwrap();
        state.write_attempts += 1;
        match state.collection.as_mut() {
            Some(collection) => {
                collection.documents.insert(key, value.clone());
                Ok(WriteOutcome::Written)
            }
            None => Ok(WriteOutcome::CollectionMissing),
        }
    }

    async fn read(&self, key: EventId) -> Result<Option<Value>> {
        Ok(self.get(key))
    }

    async fn force_delete(&self, key: EventId) -> Result<bool> {
        Ok(self.remove(key))
    }

    async fn create_collection_if_missing(&self, ttl: Duration) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.provision_calls += 1;
        if state.provisioning_disabled || state.collection.is_some() {
            return Ok(false);
        }
        state.collection = Some(Collection {
            ttl: Some(ttl),
            documents: HashMap::new(),
        });
        Ok(true)
    }
}

/// A payload store that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingPayloadStore;

#[async_trait]
impl PayloadStore for FailingPayloadStore {
    async fn create_or_overwrite(&self, _key: EventId, _value: &Value) -> Result<WriteOutcome> {
        Err(QueueError::Infrastructure("connection refused".into()))
    }

    async fn read(&self, _key: EventId) -> Result<Option<Value>> {
        Err(QueueError::Infrastructure("connection refused".into()))
    }

    async fn force_delete(&self, _key: EventId) -> Result<bool> {
        Err(QueueError::Infrastructure("connection refused".into()))
    }

    async fn create_collection_if_missing(&self, _ttl: Duration) -> Result<bool> {
        Err(QueueError::Infrastructure("connection refused".into()))
    }
}
