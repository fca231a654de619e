//! PostgreSQL adapters for the delayq event queue.

pub mod pg_event_index;
pub mod pg_payload_store;
pub mod schema;
