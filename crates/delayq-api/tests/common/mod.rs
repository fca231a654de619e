//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use delayq_core::queue_type::QueueTypeRegistry;
use delayq_store::pg_payload_store::PgPayloadStore;
use delayq_store::schema::DEFAULT_PAYLOAD_COLLECTION;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use delayq_api::state::AppState;

/// Build the full app router over PostgreSQL for both stores. Uses the same
/// route structure as `main.rs`.
pub fn build_test_app(pool: PgPool) -> Router {
    let payloads = PgPayloadStore::new(pool.clone(), DEFAULT_PAYLOAD_COLLECTION).unwrap();
    delayq_api::app(AppState::postgres(
        pool,
        payloads,
        QueueTypeRegistry::default_registry(),
    ))
}

/// Send a request with an optional JSON body and return the response.
pub async fn send_json(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<&serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send_json(app, "POST", uri, Some(body)).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send_json(app, "GET", uri, None).await
}

/// Send a DELETE request and return the response.
pub async fn delete_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send_json(app, "DELETE", uri, None).await
}
