//! `nodepilot-store`: SQLite persistence for managed machines and their
//! start/stop schedules.
//!
//! Schedules are stored as JSON columns; the scheduler's "has an enabled
//! schedule" filter is evaluated in SQL with `json_extract`.

pub mod db;
pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::MachineStore;
