use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use papergraph_core::EdgeRow;

use super::ApiError;
use crate::state::AppState;

/// `GET /api/edges`: every edge, highest id first.
pub async fn edges(State(state): State<Arc<AppState>>) -> Result<Json<Vec<EdgeRow>>, ApiError> {
    const ERROR: &str = "Failed to fetch edges";
    let store = state.store.lock().map_err(|e| ApiError::new(ERROR, e))?;
    let rows = store.list_edges().map_err(|e| ApiError::new(ERROR, e))?;
    Ok(Json(rows))
}
