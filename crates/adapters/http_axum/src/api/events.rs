//! JSON handler for publishing onto the event bus.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

use homedash_domain::topic;

use crate::error::ApiError;
use crate::state::AppState;

/// Body of a publish response.
#[derive(Debug, Serialize)]
pub struct Published {
    pub topic: String,
    /// How many listeners ran.
    pub delivered: usize,
}

/// Possible responses from the publish endpoint.
pub enum PublishResponse {
    Accepted(Json<Published>),
}

impl IntoResponse for PublishResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Accepted(json) => (StatusCode::ACCEPTED, json).into_response(),
        }
    }
}

/// `POST /api/events/{topic}` — emit the JSON body as the payload of `topic`.
///
/// Wildcards are subscription syntax only and are rejected here.
pub async fn publish(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    Json(payload): Json<Value>,
) -> Result<PublishResponse, ApiError> {
    if topic.contains('*') || !topic::is_valid_subscription(&topic) {
        return Err(ApiError::BadRequest(format!("cannot publish on topic {topic:?}")));
    }
    let delivered = state.bus.emit(&topic, payload);
    tracing::debug!(topic = %topic, delivered, "event published over http");
    Ok(PublishResponse::Accepted(Json(Published { topic, delivered })))
}
