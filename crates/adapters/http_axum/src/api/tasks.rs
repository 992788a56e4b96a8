//! JSON handlers for poller tasks.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use homedash_app::poller::{RunOutcome, TaskStatus};

use crate::error::ApiError;
use crate::state::AppState;

/// Body of a manual run response.
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub task: String,
    pub outcome: RunOutcome,
}

/// `GET /api/tasks` — introspection snapshot of every registered task.
pub async fn list(State(state): State<AppState>) -> Json<BTreeMap<String, TaskStatus>> {
    Json(state.poller.get_status())
}

/// `POST /api/tasks/{name}/run` — run a task once, outside its schedule.
pub async fn run(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<RunResponse>, ApiError> {
    let outcome = state.poller.run_now(&name).await?;
    tracing::info!(task = %name, ?outcome, "task run on demand");
    Ok(Json(RunResponse {
        task: name,
        outcome,
    }))
}
