//! JSON handlers for the diagnostic histories of the state store and event bus.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use homedash_domain::event::Event;
use homedash_domain::state_change::StateChange;

use crate::state::AppState;

/// Default number of records returned.
const DEFAULT_LIMIT: usize = 50;

/// Query parameters for both history endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Maximum number of records. Defaults to 50.
    pub limit: Option<usize>,
    /// Only records whose path (or topic) starts with this prefix.
    pub prefix: Option<String>,
}

impl HistoryQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}

/// `GET /api/history/state?limit=&prefix=` — recent state writes, oldest first.
pub async fn state_changes(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Json<Vec<StateChange>> {
    Json(
        state
            .store
            .get_history(params.limit(), params.prefix.as_deref()),
    )
}

/// `GET /api/history/events?limit=&prefix=` — recent bus events, oldest first.
pub async fn events(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Json<Vec<Event>> {
    Json(state.bus.get_history(params.limit(), params.prefix.as_deref()))
}
