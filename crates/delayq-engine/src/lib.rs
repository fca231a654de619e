//! delayq Engine: scheduled-delivery event queue.
//!
//! Producers store an event to fire at a future time together with an opaque
//! JSON payload. Consumers later claim due events, process them, and either
//! finish or roll back and requeue. Event times live in an ordered,
//! transactional index; payloads live in a separate TTL-based document store.
//! The two stores are written without a shared transaction, so an index row
//! may briefly exist without its payload (an integrity failure).
//!
//! Operating envelope for [`application::consumer::consume_events`]: fewer
//! than three consumers per queue type (one recommended), under roughly 6000
//! events per minute across all queues, and handlers that finish in well under
//! a second. Longer work should be forwarded to a message broker from the
//! handler instead.

pub mod application;
pub mod domain;
