//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use homedash_domain::error::{HomeDashError, PollerError, StateError};

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Errors a handler can answer with.
#[derive(Debug)]
pub enum ApiError {
    /// Nothing lives at the requested path, selector or task.
    NotFound(String),
    /// The request itself is malformed.
    BadRequest(String),
    /// A core service refused the operation.
    Core(HomeDashError),
}

impl From<HomeDashError> for ApiError {
    fn from(err: HomeDashError) -> Self {
        Self::Core(err)
    }
}

impl From<StateError> for ApiError {
    fn from(err: StateError) -> Self {
        Self::Core(err.into())
    }
}

impl From<PollerError> for ApiError {
    fn from(err: PollerError) -> Self {
        Self::Core(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            Self::BadRequest(reason) => (StatusCode::BAD_REQUEST, reason),
            Self::Core(HomeDashError::Poller(err @ PollerError::UnknownTask(_))) => {
                (StatusCode::NOT_FOUND, err.to_string())
            }
            Self::Core(HomeDashError::State(err @ StateError::InvalidPath(_))) => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            Self::Core(HomeDashError::Poller(err @ PollerError::InvalidInterval(_))) => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            Self::Core(err) => {
                tracing::error!(error = %err, "core service error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
