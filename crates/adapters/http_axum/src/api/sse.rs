//! Server-Sent Events (SSE) stream of event bus publishes.

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::state::AppState;

/// Query parameters for the stream endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Only forward events whose topic starts with this prefix.
    pub prefix: Option<String>,
}

/// `GET /api/events/stream?prefix=` — SSE stream of bus events.
///
/// Taps the event bus and sends each event as a JSON `data:` frame until the
/// client disconnects. A subscriber that falls behind loses events rather
/// than slowing the bus down.
pub async fn stream(
    State(state): State<AppState>,
    Query(params): Query<StreamQuery>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let prefix = params.prefix.unwrap_or_default();
    let events = BroadcastStream::new(state.bus.tap()).filter_map(move |result| match result {
        Ok(event) if event.topic_starts_with(&prefix) => match serde_json::to_string(&event) {
            Ok(json) => Some(Ok(Event::default().data(json))),
            Err(err) => {
                tracing::warn!(%err, topic = %event.topic, "failed to serialize event for SSE stream");
                None
            }
        },
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "SSE subscriber lagged, some events were dropped");
            None
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
