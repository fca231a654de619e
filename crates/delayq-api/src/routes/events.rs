//! Routes for producing, inspecting and removing scheduled events.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use delayq_core::error::QueueError;
use delayq_core::event::{EventId, IndexedEvent};
use delayq_core::query::{IndexQuery, IntegrityFailurePolicy, Order};
use delayq_core::queue_type::QueueType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::state::AppState;

/// Page size used when a listing does not ask for one.
pub const DEFAULT_LIST_LIMIT: u32 = 100;

/// Largest page a listing may ask for.
pub const MAX_LIST_LIMIT: u32 = 1000;

/// Request body for POST /{queue}/events.
#[derive(Debug, Deserialize)]
pub struct StoreEventRequest {
    /// When the event becomes due.
    pub event_at: DateTime<Utc>,
    /// Opaque payload handed to the consumer.
    pub payload: Value,
}

/// Response body for POST /{queue}/events.
#[derive(Debug, Serialize)]
pub struct StoreEventResponse {
    /// Identifier generated for the stored event.
    pub event_id: EventId,
}

/// Query string for GET /{queue}/events.
#[derive(Debug, Default, Deserialize)]
pub struct ListEventsParams {
    /// Page size, 1 to [`MAX_LIST_LIMIT`].
    pub limit: Option<u32>,
    /// Exclusive upper bound on `event_at`.
    pub before: Option<DateTime<Utc>>,
    /// Exclusive lower bound on `event_at`.
    pub after: Option<DateTime<Utc>>,
    /// `asc` (default) or `desc`.
    pub order: Option<String>,
    /// `include` (default) or `delete_and_commit`. The latter deletes and
    /// commits index rows whose payload is gone.
    pub integrity_failures: Option<String>,
}

/// Response body for DELETE /{queue}/events/{event_id}.
#[derive(Debug, Serialize)]
pub struct DeleteEventResponse {
    /// Whether the index still held the event.
    pub existed: bool,
}

fn resolve_queue(state: &AppState, name: &str) -> Result<QueueType, ApiError> {
    state
        .registry()
        .lookup(name)
        .map_err(|_| ApiError::UnknownQueue(name.to_owned()))
}

fn index_query(queue_type: QueueType, params: &ListEventsParams) -> Result<IndexQuery, QueueError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if limit == 0 || limit > MAX_LIST_LIMIT {
        return Err(QueueError::Validation(format!(
            "limit must be between 1 and {MAX_LIST_LIMIT}, got {limit}"
        )));
    }
    let order = params
        .order
        .as_deref()
        .map(str::parse::<Order>)
        .transpose()?
        .unwrap_or_default();

    let mut query = IndexQuery::new(queue_type, limit).order(order);
    if let Some(before) = params.before {
        query = query.before(before);
    }
    if let Some(after) = params.after {
        query = query.after(after);
    }
    Ok(query)
}

/// POST /{queue}/events
#[instrument(skip(state, request), fields(event_at = %request.event_at))]
async fn store_event(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    Json(request): Json<StoreEventRequest>,
) -> Result<Json<StoreEventResponse>, ApiError> {
    let queue_type = resolve_queue(&state, &queue)?;

    let event_id = state
        .engine()
        .store_event(queue_type, request.event_at, &request.payload, true)
        .await?;

    info!(%event_id, "scheduled event");

    Ok(Json(StoreEventResponse { event_id }))
}

/// GET /{queue}/events
///
/// Read-only by default. With `integrity_failures=delete_and_commit` it also
/// deletes and commits the index rows of events whose payload is gone, so
/// that form of the request is not safe to retry blindly or cache.
#[instrument(skip(state, params))]
async fn list_events(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    Query(params): Query<ListEventsParams>,
) -> Result<Json<Vec<IndexedEvent>>, ApiError> {
    let queue_type = resolve_queue(&state, &queue)?;
    let query = index_query(queue_type, &params)?;
    let policy = params
        .integrity_failures
        .as_deref()
        .map(str::parse::<IntegrityFailurePolicy>)
        .transpose()?
        .unwrap_or_default();

    let events = state.engine().index_events(&query, policy).await?;

    Ok(Json(events))
}

/// DELETE /{queue}/events/{event_id}
///
/// Only removes an event of `{queue}`; an event of another queue is left
/// alone and reported as not existing.
#[instrument(skip(state))]
async fn delete_event(
    State(state): State<AppState>,
    Path((queue, event_id)): Path<(String, String)>,
) -> Result<Json<DeleteEventResponse>, ApiError> {
    let queue_type = resolve_queue(&state, &queue)?;
    let event_id: EventId = event_id
        .parse()
        .map_err(|e| QueueError::Validation(format!("bad event id '{event_id}': {e}")))?;

    let existed = state
        .engine()
        .delete_queued_event(queue_type, event_id, true)
        .await?;

    info!(%event_id, existed, "deleted event");

    Ok(Json(DeleteEventResponse { existed }))
}

/// Returns the router for the event endpoints.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{queue}/events", get(list_events).post(store_event))
        .route("/{queue}/events/{event_id}", delete(delete_event))
}
