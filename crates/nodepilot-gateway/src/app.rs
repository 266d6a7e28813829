use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use nodepilot_core::config::NodepilotConfig;
use nodepilot_scheduler::FleetHandle;
use nodepilot_store::MachineStore;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::http::{health, machines, nodes};

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: NodepilotConfig,
    /// Machine CRUD. The scheduler reads through its own connection.
    pub store: Arc<MachineStore>,
    pub fleet: FleetHandle,
}

impl AppState {
    pub fn new(config: NodepilotConfig, store: Arc<MachineStore>, fleet: FleetHandle) -> Self {
        Self {
            config,
            store,
            fleet,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/nodes", get(nodes::list_nodes))
        .route("/api/nodes/health", get(nodes::api_health))
        .route("/api/scheduler", get(health::scheduler_stats))
        .route(
            "/api/machines",
            get(machines::list_machines).post(machines::create_machine),
        )
        .route(
            "/api/machines/{id}",
            put(machines::update_machine).delete(machines::delete_machine),
        )
        .route("/api/machines/{id}/schedule", put(machines::update_schedule))
        .route("/api/machines/{id}/start", post(machines::start_machine))
        .route("/api/machines/{id}/stop", post(machines::stop_machine))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
