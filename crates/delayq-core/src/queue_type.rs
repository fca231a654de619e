//! Queue types and the application-owned registry of them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};

/// Small integer discriminator partitioning the shared index table.
///
/// The integer is the only durable representation; once events reference a
/// value it must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueType(i16);

impl QueueType {
    /// Wraps a raw queue type value.
    #[must_use]
    pub const fn new(value: i16) -> Self {
        Self(value)
    }

    /// Returns the raw value as stored in the index.
    #[must_use]
    pub const fn value(self) -> i16 {
        self.0
    }
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Queue type used for trust-related delayed work.
pub const TRUST: QueueType = QueueType::new(0);

/// Explicit mapping from symbolic queue names to stable queue types.
///
/// Owned by the application and handed to the engine; the engine never
/// infers queue types at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTypeRegistry {
    by_name: BTreeMap<String, QueueType>,
}

impl QueueTypeRegistry {
    /// Builds a registry from `(name, queue_type)` pairs.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Validation` if a name is empty, or if a name or a
    /// value appears more than once.
    pub fn new<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, QueueType)>,
        S: Into<String>,
    {
        let mut by_name = BTreeMap::new();
        for (name, queue_type) in entries {
            let name = name.into();
            if name.is_empty() {
                return Err(QueueError::Validation(
                    "queue type name must not be empty".into(),
                ));
            }
            if by_name.values().any(|existing| *existing == queue_type) {
                return Err(QueueError::Validation(format!(
                    "queue type {queue_type} registered twice"
                )));
            }
            if by_name.insert(name.clone(), queue_type).is_some() {
                return Err(QueueError::Validation(format!(
                    "queue type name '{name}' registered twice"
                )));
            }
        }
        Ok(Self { by_name })
    }

    /// The registry shipped with the application: `trust = 0`.
    #[must_use]
    pub fn default_registry() -> Self {
        let mut by_name = BTreeMap::new();
        by_name.insert("trust".to_owned(), TRUST);
        Self { by_name }
    }

    /// Resolves a symbolic name.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Validation` if the name is not registered.
    pub fn lookup(&self, name: &str) -> Result<QueueType> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| QueueError::Validation(format!("unknown queue type name '{name}'")))
    }

    /// Returns true if `queue_type` is registered.
    #[must_use]
    pub fn contains(&self, queue_type: QueueType) -> bool {
        self.by_name.values().any(|qt| *qt == queue_type)
    }

    /// Returns the symbolic name of `queue_type`, if registered.
    #[must_use]
    pub fn name_of(&self, queue_type: QueueType) -> Option<&str> {
        self.by_name
            .iter()
            .find(|(_, qt)| **qt == queue_type)
            .map(|(name, _)| name.as_str())
    }

    /// Checks that `queue_type` belongs to this registry.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::UnknownQueueType` if it is not registered.
    pub fn ensure(&self, queue_type: QueueType) -> Result<()> {
        if self.contains(queue_type) {
            Ok(())
        } else {
            Err(QueueError::UnknownQueueType(queue_type.value()))
        }
    }

    /// Iterates over `(name, queue_type)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, QueueType)> {
        self.by_name.iter().map(|(name, qt)| (name.as_str(), *qt))
    }
}

impl Default for QueueTypeRegistry {
    fn default() -> Self {
        Self::default_registry()
    }
}
