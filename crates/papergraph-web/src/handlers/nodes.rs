use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use papergraph_core::NodeRow;

use super::ApiError;
use crate::state::AppState;

fn all_nodes(state: &AppState, error: &'static str) -> Result<Vec<NodeRow>, ApiError> {
    let store = state.store.lock().map_err(|e| ApiError::new(error, e))?;
    store.list_nodes().map_err(|e| ApiError::new(error, e))
}

/// `GET /api/papers`: every node, newest identifier first.
pub async fn papers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<NodeRow>>, ApiError> {
    all_nodes(&state, "Failed to fetch papers").map(Json)
}

/// `GET /api/nodes`: same rows as `/api/papers`.
pub async fn nodes(State(state): State<Arc<AppState>>) -> Result<Json<Vec<NodeRow>>, ApiError> {
    all_nodes(&state, "Failed to fetch nodes").map(Json)
}
