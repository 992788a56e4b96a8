//! JSON handlers for monitored backend connections.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;

use homedash_domain::connection::ConnectionStatus;

use crate::state::AppState;

/// `GET /api/connections` — last-known status of every monitored service.
pub async fn list(State(state): State<AppState>) -> Json<BTreeMap<String, ConnectionStatus>> {
    Json(state.monitor.get_status())
}

/// `POST /api/connections/check` — probe every service now.
///
/// A sweep already in progress answers with the last-known snapshot.
pub async fn check(State(state): State<AppState>) -> Json<BTreeMap<String, ConnectionStatus>> {
    tracing::debug!("connection sweep requested over http");
    Json(state.monitor.check_all().await)
}
