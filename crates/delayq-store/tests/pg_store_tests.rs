//! Integration tests for `PgEventIndex` and `PgPayloadStore`.
//!
//! These need a PostgreSQL server reachable through `DATABASE_URL`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use delayq_core::clock::SystemClock;
use delayq_core::event::{EventId, NewIndexRecord};
use delayq_core::query::{IndexQuery, IntegrityFailurePolicy, Order};
use delayq_core::queue_type::{QueueType, QueueTypeRegistry, TRUST};
use delayq_core::repository::{EventIndex, PayloadStore, WriteOutcome};
use delayq_engine::application::engine::QueueEngine;
use delayq_store::pg_event_index::PgEventIndex;
use delayq_store::pg_payload_store::PgPayloadStore;
use delayq_store::schema::DEFAULT_PAYLOAD_COLLECTION;
use serde_json::json;
use sqlx::PgPool;

fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, minute, 0).unwrap()
}

fn payload_store(pool: &PgPool) -> PgPayloadStore {
    PgPayloadStore::new(pool.clone(), DEFAULT_PAYLOAD_COLLECTION).unwrap()
}

fn build_engine(pool: &PgPool) -> QueueEngine {
    QueueEngine::new(
        Arc::new(PgEventIndex::new(pool.clone())),
        Arc::new(payload_store(pool)),
        Arc::new(SystemClock),
        QueueTypeRegistry::default_registry(),
    )
}

// --- payload store ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_write_to_missing_collection_reports_it(pool: PgPool) {
    let store = payload_store(&pool);

    let outcome = store
        .create_or_overwrite(EventId::generate(), &json!({}))
        .await
        .unwrap();

    assert_eq!(outcome, WriteOutcome::CollectionMissing);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_missing_collection_reads_and_deletes_as_absent(pool: PgPool) {
    let store = payload_store(&pool);
    let key = EventId::generate();

    assert_eq!(store.read(key).await.unwrap(), None);
    assert!(!store.force_delete(key).await.unwrap());
    assert_eq!(store.purge_expired().await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_collection_is_created_once(pool: PgPool) {
    let store = payload_store(&pool);
    let ttl = Duration::from_secs(60);

    assert!(store.create_collection_if_missing(ttl).await.unwrap());
    assert!(!store.create_collection_if_missing(ttl).await.unwrap());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_payload_write_overwrite_read_delete(pool: PgPool) {
    let store = payload_store(&pool);
    store
        .create_collection_if_missing(Duration::from_secs(60))
        .await
        .unwrap();
    let key = EventId::generate();

    store.create_or_overwrite(key, &json!({"v": 1})).await.unwrap();
    store.create_or_overwrite(key, &json!({"v": 2})).await.unwrap();

    assert_eq!(store.read(key).await.unwrap(), Some(json!({"v": 2})));
    assert!(store.force_delete(key).await.unwrap());
    assert!(!store.force_delete(key).await.unwrap());
    assert_eq!(store.read(key).await.unwrap(), None);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_expired_payloads_are_invisible_and_purged(pool: PgPool) {
    let store = payload_store(&pool);
    store
        .create_collection_if_missing(Duration::from_secs(0))
        .await
        .unwrap();
    let key = EventId::generate();
    store.create_or_overwrite(key, &json!("stale")).await.unwrap();

    assert_eq!(store.read(key).await.unwrap(), None);
    assert_eq!(store.purge_expired().await.unwrap(), 1);
}

// --- event index ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_uncommitted_insert_is_invisible_to_other_sessions(pool: PgPool) {
    let writer = PgEventIndex::new(pool.clone());
    let reader = PgEventIndex::new(pool);
    let record = NewIndexRecord {
        event_id: EventId::generate(),
        queue_type: TRUST,
        event_at: at(0),
    };
    let query = IndexQuery::new(TRUST, 10);

    writer.insert(&record).await.unwrap();
    assert_eq!(writer.select(&query).await.unwrap().len(), 1);
    assert!(reader.select(&query).await.unwrap().is_empty());

    writer.commit().await.unwrap();
    assert_eq!(reader.select(&query).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_rollback_discards_pending_insert(pool: PgPool) {
    let index = PgEventIndex::new(pool);
    index
        .insert(&NewIndexRecord {
            event_id: EventId::generate(),
            queue_type: TRUST,
            event_at: at(0),
        })
        .await
        .unwrap();

    index.rollback().await.unwrap();

    assert!(index
        .select(&IndexQuery::new(TRUST, 10))
        .await
        .unwrap()
        .is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_select_orders_and_bounds(pool: PgPool) {
    let index = PgEventIndex::new(pool);
    for minute in [3, 1, 4, 0, 2] {
        index
            .insert(&NewIndexRecord {
                event_id: EventId::generate(),
                queue_type: TRUST,
                event_at: at(minute),
            })
            .await
            .unwrap();
    }
    index.commit().await.unwrap();

    let asc = index.select(&IndexQuery::new(TRUST, 10)).await.unwrap();
    let desc = index
        .select(&IndexQuery::new(TRUST, 2).order(Order::Desc))
        .await
        .unwrap();
    let window = index
        .select(&IndexQuery::new(TRUST, 10).after(at(1)).before(at(4)))
        .await
        .unwrap();

    let minutes = |rows: &[delayq_core::event::IndexRow]| -> Vec<DateTime<Utc>> {
        rows.iter().map(|r| r.event_at).collect()
    };
    assert_eq!(minutes(&asc), vec![at(0), at(1), at(2), at(3), at(4)]);
    assert_eq!(minutes(&desc), vec![at(4), at(3)]);
    assert_eq!(minutes(&window), vec![at(2), at(3)]);
}

// --- engine over PostgreSQL ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_store_then_index_round_trip(pool: PgPool) {
    let engine = build_engine(&pool);
    let event_at = at(0);

    let event_id = engine
        .store_event(TRUST, event_at, &json!({"a": 1}), true)
        .await
        .unwrap();

    let events = engine
        .index_events(
            &IndexQuery::new(TRUST, 10).before(at(1)),
            IntegrityFailurePolicy::Include,
        )
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id, event_id);
    assert_eq!(events[0].event_at, event_at);
    assert_eq!(events[0].payload, Some(json!({"a": 1})));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_delete_and_commit_removes_rows_without_payload(pool: PgPool) {
    let engine = build_engine(&pool);
    let event_id = engine
        .store_event(TRUST, at(0), &json!({}), true)
        .await
        .unwrap();
    payload_store(&pool).force_delete(event_id).await.unwrap();

    let events = engine
        .index_events(
            &IndexQuery::new(TRUST, 10),
            IntegrityFailurePolicy::DeleteAndCommit,
        )
        .await
        .unwrap();
    assert!(events.is_empty());

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM delayed_queue")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_concurrent_claims_grant_exactly_one(pool: PgPool) {
    let event_id = build_engine(&pool)
        .store_event(TRUST, at(0), &json!({}), true)
        .await
        .unwrap();
    let a = build_engine(&pool);
    let b = build_engine(&pool);

    let (first, second) = tokio::join!(a.delete_event(event_id, true), b.delete_event(event_id, true));

    assert!(first.unwrap() ^ second.unwrap());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_queued_delete_ignores_event_of_other_queue(pool: PgPool) {
    let loans = QueueType::new(1);
    let registry = QueueTypeRegistry::new([("trust", TRUST), ("loans", loans)]).unwrap();
    let engine = QueueEngine::new(
        Arc::new(PgEventIndex::new(pool.clone())),
        Arc::new(payload_store(&pool)),
        Arc::new(SystemClock),
        registry,
    );
    let event_id = engine
        .store_event(loans, at(0), &json!({"loan": 7}), true)
        .await
        .unwrap();

    assert!(!engine.delete_queued_event(TRUST, event_id, true).await.unwrap());
    assert_eq!(
        PgEventIndex::new(pool.clone()).queue_type_of(event_id).await.unwrap(),
        Some(loans)
    );
    assert_eq!(
        payload_store(&pool).read(event_id).await.unwrap(),
        Some(json!({"loan": 7}))
    );

    assert!(engine.delete_queued_event(loans, event_id, true).await.unwrap());
    assert_eq!(
        PgEventIndex::new(pool).queue_type_of(event_id).await.unwrap(),
        None
    );
}
