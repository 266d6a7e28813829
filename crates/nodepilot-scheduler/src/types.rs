use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of invoking a start/stop control endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Outcome {
    /// The endpoint answered 2xx.
    Success,
    /// The endpoint answered 4xx: the machine is already in the requested
    /// state ("already running" / "already stopped").
    SuccessAlreadyInState,
    /// The call cannot succeed by retrying (e.g. malformed URL).
    PermanentFailure(String),
    /// Every attempt hit a 5xx, timeout or network error.
    RetriesExhausted,
}

impl Outcome {
    /// `Success` and `SuccessAlreadyInState` both leave the machine where the
    /// caller wanted it.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success | Outcome::SuccessAlreadyInState)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::SuccessAlreadyInState => write!(f, "success (already in state)"),
            Outcome::PermanentFailure(msg) => write!(f, "permanent failure: {msg}"),
            Outcome::RetriesExhausted => write!(f, "retries exhausted"),
        }
    }
}

/// Cached status of one node as last reported by the status source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub node_id: String,
    pub name: String,
    pub os: String,
    pub ip: String,
    /// Opaque boot timestamp exactly as the source reports it.
    #[serde(rename = "lastbootuptime")]
    pub last_boot_time: String,
    pub status: String,
    /// Active connection count.
    pub conn: u32,
    /// Power gauge.
    pub pwr: f64,
    /// When the poll that wrote this row completed.
    pub last_updated: DateTime<Utc>,
}

/// Health of the node-status source, as seen by the status cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    pub is_working: bool,
    /// Empty when the last poll succeeded.
    pub last_error: String,
    pub last_successful: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl ApiHealth {
    /// Optimistic initial state: working, no failures recorded.
    pub fn new() -> Self {
        Self {
            is_working: true,
            last_error: String::new(),
            last_successful: None,
            consecutive_failures: 0,
        }
    }

    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.is_working = true;
        self.last_error.clear();
        self.last_successful = Some(at);
        self.consecutive_failures = 0;
    }

    /// Record a failed poll. Returns `true` exactly when this failure makes the
    /// counter reach `degraded_threshold`, i.e. once per outage.
    pub fn record_failure(&mut self, error: String, degraded_threshold: u32) -> bool {
        self.is_working = false;
        self.last_error = error;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        degraded_threshold > 0 && self.consecutive_failures == degraded_threshold
    }
}

impl Default for ApiHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time read of the status cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    /// Ordered by node id.
    pub nodes: Vec<NodeStatus>,
    pub health: ApiHealth,
}

/// Whether a scheduler tick is currently being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickState {
    Idle,
    Running,
}

impl std::fmt::Display for TickState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickState::Idle => write!(f, "idle"),
            TickState::Running => write!(f, "running"),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TickOutcome {
    /// All due schedules were dispatched. `failed` counts actions whose
    /// outcome was not a success.
    Completed {
        evaluated: usize,
        fired: usize,
        failed: usize,
    },
    /// The tick aborted before dispatching (e.g. the store query failed).
    Failed { error: String },
    /// Dropped because the previous tick was still running.
    Skipped,
}

/// Scheduler observability counters, exposed read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickStats {
    pub state: TickState,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    /// Outcome of the most recent tick that actually ran.
    pub last_outcome: Option<TickOutcome>,
    pub ticks_completed: u64,
    pub ticks_skipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_signal_fires_once_per_outage() {
        let mut health = ApiHealth::new();
        let signals: Vec<bool> = (0..8)
            .map(|i| health.record_failure(format!("boom {i}"), 5))
            .collect();
        assert_eq!(signals.iter().filter(|s| **s).count(), 1);
        assert!(signals[4]);
        assert!(!health.is_working);
        assert_eq!(health.consecutive_failures, 8);
        assert_eq!(health.last_error, "boom 7");
    }

    #[test]
    fn success_resets_failures() {
        let mut health = ApiHealth::new();
        for _ in 0..6 {
            health.record_failure("down".into(), 5);
        }
        let now = Utc::now();
        health.record_success(now);
        assert!(health.is_working);
        assert_eq!(health.consecutive_failures, 0);
        assert!(health.last_error.is_empty());
        assert_eq!(health.last_successful, Some(now));

        // a new outage crosses the threshold again
        let crossed = (0..5).any(|_| health.record_failure("down".into(), 5));
        assert!(crossed);
    }

    #[test]
    fn zero_threshold_never_signals() {
        let mut health = ApiHealth::new();
        assert!(!(0..10).any(|_| health.record_failure("x".into(), 0)));
    }

    #[test]
    fn outcome_success_classification() {
        assert!(Outcome::Success.is_success());
        assert!(Outcome::SuccessAlreadyInState.is_success());
        assert!(!Outcome::RetriesExhausted.is_success());
        assert!(!Outcome::PermanentFailure("bad url".into()).is_success());
    }

    #[test]
    fn outcome_wire_format() {
        let json = serde_json::to_value(Outcome::PermanentFailure("bad url".into())).unwrap();
        assert_eq!(json["kind"], "permanent_failure");
        assert_eq!(json["message"], "bad url");
        let json = serde_json::to_value(Outcome::SuccessAlreadyInState).unwrap();
        assert_eq!(json["kind"], "success_already_in_state");
    }
}
