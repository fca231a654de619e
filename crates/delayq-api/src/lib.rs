//! delayq API: HTTP surface for producing and inspecting scheduled events.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::Router;

use crate::state::AppState;

/// Builds the application router without middleware layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/queues", routes::events::router())
        .with_state(state)
}
