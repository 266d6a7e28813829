//! `nodepilot-core`: configuration, error type and domain model shared by
//! every nodepilot crate.

pub mod config;
pub mod error;
pub mod types;

pub use error::{NodepilotError, Result};
