//! `nodepilot-scheduler`: the scheduling and action-execution core.
//!
//! # Overview
//!
//! The [`engine::SchedulerEngine`] ticks once per minute. Each tick refreshes
//! the [`status::StatusCache`], loads every machine with an enabled schedule,
//! evaluates its start and stop schedules with [`schedule::should_fire`] and
//! runs due actions through the [`executor::ActionExecutor`]. Overlapping
//! ticks are dropped, not queued.
//!
//! # Schedule variants
//!
//! | Variant | Behaviour                                              |
//! |---------|--------------------------------------------------------|
//! | `daily` | Fire at HH:MM every day                                |
//! | `range` | Fire at HH:MM on every date in `[fromDate, toDate]`    |
//! | other   | Never fires                                            |

pub mod engine;
pub mod error;
pub mod executor;
pub mod fleet;
pub mod schedule;
pub mod status;
pub mod types;

pub use engine::{SchedulerEngine, TickMonitor};
pub use error::{Result, SchedulerError};
pub use executor::{ActionExecutor, RetryPolicy};
pub use fleet::{FleetHandle, MachineSource};
pub use schedule::should_fire;
pub use status::StatusCache;
pub use types::{ApiHealth, NodeStatus, Outcome, StatusSnapshot, TickOutcome, TickState, TickStats};
