use axum::{extract::State, Json};
use nodepilot_scheduler::TickStats;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness probe with status-source health and scheduler state.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "gitSha": env!("NODEPILOT_GIT_SHA"),
        "clock": state.config.scheduler.clock,
        "api": state.fleet.api_health(),
        "scheduler": state.fleet.tick_stats(),
    }))
}

/// GET /api/scheduler
pub async fn scheduler_stats(State(state): State<Arc<AppState>>) -> Json<TickStats> {
    Json(state.fleet.tick_stats())
}
