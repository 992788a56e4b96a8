//! JSON REST API handler modules.

#[allow(clippy::missing_errors_doc)]
pub mod connections;
#[allow(clippy::missing_errors_doc)]
pub mod events;
#[allow(clippy::missing_errors_doc)]
pub mod history;
pub mod sse;
#[allow(clippy::missing_errors_doc)]
pub mod state;
#[allow(clippy::missing_errors_doc)]
pub mod tasks;

use axum::Router;
use axum::routing::{get, post};

use crate::state::AppState;

/// Build the `/api` sub-router.
pub fn routes() -> Router<AppState> {
    Router::new()
        // State tree
        .route("/state", get(state::get_all))
        .route("/state/{path}", get(state::get))
        .route("/selectors/{name}", get(state::select))
        // Diagnostics
        .route("/history/state", get(history::state_changes))
        .route("/history/events", get(history::events))
        // Connections
        .route("/connections", get(connections::list))
        .route("/connections/check", post(connections::check))
        // Poller
        .route("/tasks", get(tasks::list))
        .route("/tasks/{name}/run", post(tasks::run))
        // Event bus
        .route("/events/stream", get(sse::stream))
        .route("/events/{topic}", post(events::publish))
}
