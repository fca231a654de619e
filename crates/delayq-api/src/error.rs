//! delayq API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use delayq_core::error::QueueError;
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The queue stack could not be assembled.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// Request-level failures that implement `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The `{queue}` path segment names no registered queue type.
    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    /// The engine rejected or failed the request.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            Self::UnknownQueue(_) | Self::Queue(QueueError::UnknownQueueType(_)) => {
                (StatusCode::NOT_FOUND, "unknown_queue_type")
            }
            Self::Queue(QueueError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "validation_error")
            }
            Self::Queue(QueueError::CollectionUnavailable(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "collection_unavailable")
            }
            Self::Queue(QueueError::Infrastructure(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error")
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            error: error_code,
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn status_of(err: ApiError) -> StatusCode {
        let response = err.into_response();
        response.status()
    }

    #[test]
    fn test_unknown_queue_maps_to_404() {
        assert_eq!(
            status_of(ApiError::UnknownQueue("billing".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ApiError::Queue(QueueError::UnknownQueueType(9))),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_validation_maps_to_400() {
        assert_eq!(
            status_of(QueueError::Validation("bad order".into()).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_collection_unavailable_maps_to_500() {
        assert_eq!(
            status_of(QueueError::CollectionUnavailable("payloads".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_infrastructure_maps_to_500() {
        assert_eq!(
            status_of(QueueError::Infrastructure("db down".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
