use nodepilot_core::types::Direction;
use nodepilot_store::StoreError;
use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
///
/// Control-endpoint failures are not errors here: the executor reports them
/// as an [`Outcome`](crate::types::Outcome) value.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The machine store could not be queried.
    #[error("Machine store error: {0}")]
    Store(#[from] StoreError),

    #[error("Machine not found: {id}")]
    MachineNotFound { id: String },

    /// The machine exists but has no URL configured for the requested action.
    #[error("Machine {id} has no {direction} URL")]
    MissingEndpoint { id: String, direction: Direction },

    /// HTTP client construction or transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The node-status source answered, but not with a usable payload.
    #[error("Status source error: {0}")]
    StatusSource(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
