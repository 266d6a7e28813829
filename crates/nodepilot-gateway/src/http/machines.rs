use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use nodepilot_core::types::{Direction, Machine, MachineDetails, Schedule};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{app::AppState, http::error::ApiError};

type ApiResult<T> = Result<T, ApiError>;

/// Body of `PUT /api/machines/{id}/schedule`. An omitted schedule is
/// replaced by a disabled one.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleUpdate {
    #[serde(default)]
    pub start_schedule: Schedule,
    #[serde(default)]
    pub stop_schedule: Schedule,
}

/// GET /api/machines
pub async fn list_machines(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Machine>>> {
    Ok(Json(state.store.list()?))
}

/// POST /api/machines: answers 200 with the saved machine.
pub async fn create_machine(
    State(state): State<Arc<AppState>>,
    Json(details): Json<MachineDetails>,
) -> ApiResult<Json<Machine>> {
    Ok(Json(state.store.create(details)?))
}

/// PUT /api/machines/{id}
pub async fn update_machine(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(details): Json<MachineDetails>,
) -> ApiResult<Json<Machine>> {
    Ok(Json(state.store.update_details(&id, details)?))
}

/// PUT /api/machines/{id}/schedule
pub async fn update_schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<ScheduleUpdate>,
) -> ApiResult<Json<Machine>> {
    let machine = state
        .store
        .update_schedules(&id, update.start_schedule, update.stop_schedule)?;
    Ok(Json(machine))
}

/// DELETE /api/machines/{id}
pub async fn delete_machine(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.store.delete(&id)? {
        return Err(ApiError::not_found(&id));
    }
    Ok(Json(json!({ "success": true })))
}

/// POST /api/machines/{id}/start
pub async fn start_machine(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    trigger(&state, &id, Direction::Start).await
}

/// POST /api/machines/{id}/stop
pub async fn stop_machine(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    trigger(&state, &id, Direction::Stop).await
}

async fn trigger(
    state: &AppState,
    id: &str,
    direction: Direction,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let outcome = state.fleet.trigger(id, direction).await?;
    if outcome.is_success() {
        Ok((
            StatusCode::OK,
            Json(json!({ "success": true, "outcome": outcome })),
        ))
    } else {
        Ok((
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "success": false,
                "error": format!("Failed to {direction} machine: {outcome}"),
                "outcome": outcome,
            })),
        ))
    }
}
