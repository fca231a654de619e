//! Delayed queue database schema.

use std::time::Duration;

/// SQL to create the event index table. Mirrors the initial migration.
pub const CREATE_DELAYED_QUEUE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS delayed_queue (
    id         BIGSERIAL PRIMARY KEY,
    uuid       UUID NOT NULL UNIQUE,
    queue_type SMALLINT NOT NULL,
    event_at   TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_delayed_queue_queue_type_event_at
    ON delayed_queue (queue_type, event_at);
";

/// Default name of the payload collection table.
pub const DEFAULT_PAYLOAD_COLLECTION: &str = "delayed_queue_payloads";

/// Longest identifier PostgreSQL keeps without truncation.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Returns true if `name` is a lowercase, unquoted SQL identifier that can be
/// interpolated into DDL safely.
#[must_use]
pub fn is_valid_collection_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// SQL to create a payload collection whose rows expire `ttl` after their
/// last write. `collection` must satisfy [`is_valid_collection_name`].
#[must_use]
pub fn create_payload_collection_sql(collection: &str, ttl: Duration) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {collection} (
    key        UUID PRIMARY KEY,
    value      JSONB NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL DEFAULT (now() + interval '{secs} seconds')
)",
        secs = ttl.as_secs()
    )
}

/// SQL to index a payload collection on its expiry time.
#[must_use]
pub fn create_payload_expiry_index_sql(collection: &str) -> String {
    format!("CREATE INDEX IF NOT EXISTS idx_{collection}_expires_at ON {collection} (expires_at)")
}
