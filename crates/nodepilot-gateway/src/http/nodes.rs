use axum::{extract::State, Json};
use nodepilot_scheduler::{ApiHealth, NodeStatus};
use std::sync::Arc;

use crate::app::AppState;

// Both endpoints serve whatever the cache holds; polling happens only in the
// refresh loop and at the start of each scheduler tick.

/// GET /api/nodes
pub async fn list_nodes(State(state): State<Arc<AppState>>) -> Json<Vec<NodeStatus>> {
    Json(state.fleet.snapshot().nodes)
}

/// GET /api/nodes/health
pub async fn api_health(State(state): State<Arc<AppState>>) -> Json<ApiHealth> {
    Json(state.fleet.api_health())
}
