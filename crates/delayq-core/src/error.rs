//! Queue error types.

use thiserror::Error;

/// Result alias used by every store and engine operation.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Top-level queue error type.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue type is not part of the registry the engine was built with.
    #[error("unknown queue type: {0}")]
    UnknownQueueType(i16),

    /// A caller supplied an invalid argument (bad order, bad policy, bad name).
    #[error("validation error: {0}")]
    Validation(String),

    /// The payload collection was still missing after provisioning it and
    /// retrying the write once.
    #[error("payload collection unavailable: {0}")]
    CollectionUnavailable(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
