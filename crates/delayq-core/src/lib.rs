//! delayq Core: shared abstractions for the scheduled-delivery event queue.
//!
//! This crate defines the identifiers, query types and store contracts that
//! the engine and the storage adapters agree on. It contains no
//! infrastructure code.

pub mod clock;
pub mod error;
pub mod event;
pub mod query;
pub mod queue_type;
pub mod repository;
pub mod signal;
