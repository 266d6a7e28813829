use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nodepilot_core::NodepilotError;
use nodepilot_scheduler::SchedulerError;
use nodepilot_store::StoreError;
use serde::Serialize;

/// JSON error body: `{ "error": message, "code": CODE }`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

/// Handler error carrying the HTTP status it maps to.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: message.into(),
                code,
            },
        }
    }

    pub fn not_found(id: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "MACHINE_NOT_FOUND",
            format!("Machine not found: {id}"),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<NodepilotError> for ApiError {
    fn from(e: NodepilotError) -> Self {
        let status = match e {
            NodepilotError::InvalidSchedule(_) | NodepilotError::InvalidMachine(_) => {
                StatusCode::BAD_REQUEST
            }
            NodepilotError::MachineNotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.code(), e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::not_found(&id),
            StoreError::Invalid(inner) => inner.into(),
            StoreError::Database(db) => {
                tracing::error!("database error: {db}");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    db.to_string(),
                )
            }
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::Store(inner) => inner.into(),
            SchedulerError::MachineNotFound { id } => Self::not_found(&id),
            SchedulerError::MissingEndpoint { .. } => {
                Self::new(StatusCode::NOT_FOUND, "MISSING_ENDPOINT", e.to_string())
            }
            SchedulerError::Http(_) | SchedulerError::StatusSource(_) => {
                Self::new(StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodepilot_core::types::Direction;

    #[test]
    fn store_errors_map_to_status_codes() {
        let e: ApiError = StoreError::NotFound("m1".into()).into();
        assert_eq!(e.status, StatusCode::NOT_FOUND);
        assert_eq!(e.body.code, "MACHINE_NOT_FOUND");

        let e: ApiError =
            StoreError::Invalid(NodepilotError::InvalidSchedule("bad time".into())).into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.body.code, "INVALID_SCHEDULE");
    }

    #[test]
    fn missing_endpoint_is_not_found() {
        let e: ApiError = SchedulerError::MissingEndpoint {
            id: "m1".into(),
            direction: Direction::Stop,
        }
        .into();
        assert_eq!(e.status, StatusCode::NOT_FOUND);
        assert_eq!(e.body.error, "Machine m1 has no stop URL");
    }
}
