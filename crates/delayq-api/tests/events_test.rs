//! Integration tests for the event endpoints over PostgreSQL.

mod common;

use axum::http::StatusCode;
use sqlx::PgPool;
use uuid::Uuid;

#[sqlx::test(migrations = "../../migrations")]
async fn test_health_returns_200_with_status_ok(pool: PgPool) {
    let app = common::build_test_app(pool);

    let (status, json) = common::get_json(app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_store_list_delete_round_trip(pool: PgPool) {
    // POST provisions the payload collection on first use.
    let app = common::build_test_app(pool.clone());
    let (status, json) = common::post_json(
        app,
        "/api/v1/queues/trust/events",
        &serde_json::json!({
            "event_at": "2026-01-15T10:00:00Z",
            "payload": { "user_id": 42 }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let event_id = json["event_id"].as_str().unwrap().to_owned();
    Uuid::parse_str(&event_id).unwrap();

    // GET: the event is visible with its payload.
    let app = common::build_test_app(pool.clone());
    let (status, json) = common::get_json(app, "/api/v1/queues/trust/events").await;
    assert_eq!(status, StatusCode::OK);
    let events = json.as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event_id"], event_id);
    assert_eq!(events[0]["payload"]["user_id"], 42);

    // DELETE: first claim wins, second reports absence.
    let uri = format!("/api/v1/queues/trust/events/{event_id}");
    let app = common::build_test_app(pool.clone());
    let (status, json) = common::delete_json(app, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["existed"], true);

    let app = common::build_test_app(pool.clone());
    let (_, json) = common::delete_json(app, &uri).await;
    assert_eq!(json["existed"], false);

    let app = common::build_test_app(pool);
    let (_, json) = common::get_json(app, "/api/v1/queues/trust/events").await;
    assert!(json.as_array().unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_unknown_queue_returns_404(pool: PgPool) {
    let app = common::build_test_app(pool);

    let (status, json) = common::get_json(app, "/api/v1/queues/billing/events").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "unknown_queue_type");
}
