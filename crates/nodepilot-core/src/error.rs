use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodepilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid machine: {0}")]
    InvalidMachine(String),

    #[error("Machine not found: {id}")]
    MachineNotFound { id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NodepilotError {
    /// Short error code string returned to HTTP clients alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            NodepilotError::Config(_) => "CONFIG_ERROR",
            NodepilotError::InvalidSchedule(_) => "INVALID_SCHEDULE",
            NodepilotError::InvalidMachine(_) => "INVALID_MACHINE",
            NodepilotError::MachineNotFound { .. } => "MACHINE_NOT_FOUND",
            NodepilotError::Serialization(_) => "SERIALIZATION_ERROR",
            NodepilotError::Io(_) => "IO_ERROR",
            NodepilotError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, NodepilotError>;
