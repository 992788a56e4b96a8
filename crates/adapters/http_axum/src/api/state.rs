//! JSON handlers for the state tree and its derived selectors.

use axum::Json;
use axum::extract::{Path, State};
use serde_json::Value;

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /api/state` — the whole state tree.
pub async fn get_all(State(state): State<AppState>) -> Json<Value> {
    Json(state.store.get_all())
}

/// `GET /api/state/{path}` — the value at a dotted path.
pub async fn get(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .store
        .get(&path)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("state path {path:?}")))
}

/// `GET /api/selectors/{name}` — evaluate a registered selector.
pub async fn select(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .store
        .select(&name)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("selector {name:?}")))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use homedash_app::state::SetOptions;
    use serde_json::json;

    use crate::test_support::{Harness, send};

    #[tokio::test]
    async fn should_return_whole_tree_when_state_requested() {
        let harness = Harness::new();
        harness
            .context
            .store()
            .set("lights.kitchen.on", json!(true), SetOptions::default())
            .unwrap();

        let (status, body) = send(harness.router(), Method::GET, "/api/state").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lights"]["kitchen"]["on"], json!(true));
    }

    #[tokio::test]
    async fn should_return_nested_value_when_path_exists() {
        let harness = Harness::new();
        harness
            .context
            .store()
            .set("temperatures.office", json!({"value": 21.5}), SetOptions::default())
            .unwrap();

        let (status, body) =
            send(harness.router(), Method::GET, "/api/state/temperatures.office.value").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(21.5));
    }

    #[tokio::test]
    async fn should_return_404_when_path_is_absent() {
        let harness = Harness::new();

        let (status, body) = send(harness.router(), Method::GET, "/api/state/nowhere").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("nowhere"));
    }

    #[tokio::test]
    async fn should_evaluate_builtin_selector_when_requested() {
        let harness = Harness::new();
        let store = harness.context.store();
        store
            .set("lights.b", json!({"on": true}), SetOptions::default())
            .unwrap();
        store
            .set("lights.a", json!({"on": true}), SetOptions::default())
            .unwrap();
        store
            .set("lights.c", json!({"on": false}), SetOptions::default())
            .unwrap();

        let (status, body) = send(harness.router(), Method::GET, "/api/selectors/lightsOn").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["a", "b"]));
    }

    #[tokio::test]
    async fn should_return_404_when_selector_is_unknown() {
        let harness = Harness::new();

        let (status, _) = send(harness.router(), Method::GET, "/api/selectors/missing").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
