//! Shared application state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use delayq_core::clock::{Clock, SystemClock};
use delayq_core::queue_type::QueueTypeRegistry;
use delayq_core::repository::{EventIndex, PayloadStore};
use delayq_engine::application::engine::{DEFAULT_PAYLOAD_TTL, QueueEngine};
use delayq_store::pg_event_index::PgEventIndex;
use delayq_store::pg_payload_store::PgPayloadStore;
use sqlx::PgPool;

/// Opens a fresh event index session.
pub type IndexSessionFactory = Arc<dyn Fn() -> Arc<dyn EventIndex> + Send + Sync>;

/// Application state shared across all request handlers.
///
/// Every request gets its own index session, so one request's open
/// transaction never leaks into another's.
#[derive(Clone)]
pub struct AppState {
    open_index: IndexSessionFactory,
    payloads: Arc<dyn PayloadStore>,
    clock: Arc<dyn Clock>,
    registry: QueueTypeRegistry,
    payload_ttl: Duration,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("registry", &self.registry)
            .field("payload_ttl", &self.payload_ttl)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        open_index: IndexSessionFactory,
        payloads: Arc<dyn PayloadStore>,
        clock: Arc<dyn Clock>,
        registry: QueueTypeRegistry,
    ) -> Self {
        Self {
            open_index,
            payloads,
            clock,
            registry,
            payload_ttl: DEFAULT_PAYLOAD_TTL,
        }
    }

    /// State backed by PostgreSQL for both stores, with the system clock.
    #[must_use]
    pub fn postgres(pool: PgPool, payloads: PgPayloadStore, registry: QueueTypeRegistry) -> Self {
        let open_index: IndexSessionFactory =
            Arc::new(move || Arc::new(PgEventIndex::new(pool.clone())) as Arc<dyn EventIndex>);
        Self::new(open_index, Arc::new(payloads), Arc::new(SystemClock), registry)
    }

    /// Overrides the TTL used when the payload collection must be provisioned.
    #[must_use]
    pub fn with_payload_ttl(mut self, ttl: Duration) -> Self {
        self.payload_ttl = ttl;
        self
    }

    /// The registry resolving `{queue}` path segments.
    #[must_use]
    pub fn registry(&self) -> &QueueTypeRegistry {
        &self.registry
    }

    /// An engine over a new index session.
    #[must_use]
    pub fn engine(&self) -> QueueEngine {
        QueueEngine::new(
            (self.open_index)(),
            Arc::clone(&self.payloads),
            Arc::clone(&self.clock),
            self.registry.clone(),
        )
        .with_payload_ttl(self.payload_ttl)
    }
}
