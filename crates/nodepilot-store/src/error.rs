use nodepilot_core::NodepilotError;
use thiserror::Error;

/// All machine-store errors. Kept separate from NodepilotError so the gateway
/// can map them to HTTP status codes without coupling layers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Machine not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Input rejected by domain validation (missing fields, bad schedule).
    #[error(transparent)]
    Invalid(#[from] NodepilotError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
