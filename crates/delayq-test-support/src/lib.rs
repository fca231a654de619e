//! Shared test doubles and utilities for the delayq event queue.

mod clock;
mod index;
mod payload;

pub use clock::FixedClock;
pub use index::{FailingEventIndex, InMemoryEventIndex, InMemoryIndexTable};
pub use payload::{FailingPayloadStore, InMemoryPayloadStore};
