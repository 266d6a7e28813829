use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use nodepilot_core::config::{ClockMode, SchedulerConfig};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::{
    error::Result,
    fleet::FleetHandle,
    schedule::due_actions,
    types::{TickOutcome, TickState, TickStats},
};

/// Overlap guard and observability record for scheduler ticks.
///
/// The `running` flag is the only mutual exclusion between ticks; it is
/// claimed with a compare-and-swap and released by [`TickGuard`]'s `Drop`, so
/// a tick that errors or panics still returns the loop to `Idle`.
pub struct TickMonitor {
    running: AtomicBool,
    stats: Mutex<TickRecord>,
}

#[derive(Default)]
struct TickRecord {
    last_started_at: Option<DateTime<Utc>>,
    last_duration: Option<Duration>,
    last_outcome: Option<TickOutcome>,
    ticks_completed: u64,
    ticks_skipped: u64,
}

/// Held for the duration of one tick; dropping it returns the monitor to `Idle`.
pub struct TickGuard<'a> {
    monitor: &'a TickMonitor,
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.monitor.running.store(false, Ordering::Release);
    }
}

impl TickMonitor {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            stats: Mutex::new(TickRecord::default()),
        }
    }

    pub fn state(&self) -> TickState {
        if self.running.load(Ordering::Acquire) {
            TickState::Running
        } else {
            TickState::Idle
        }
    }

    /// Claim the `Idle → Running` transition. `None` if a tick is in progress.
    pub fn try_begin(&self) -> Option<TickGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickGuard { monitor: self })
    }

    pub fn stats(&self) -> TickStats {
        let record = self.record();
        TickStats {
            state: self.state(),
            last_started_at: record.last_started_at,
            last_duration_ms: record.last_duration.map(|d| d.as_millis() as u64),
            last_outcome: record.last_outcome.clone(),
            ticks_completed: record.ticks_completed,
            ticks_skipped: record.ticks_skipped,
        }
    }

    fn record(&self) -> std::sync::MutexGuard<'_, TickRecord> {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_finished(&self, started_at: DateTime<Utc>, duration: Duration, outcome: TickOutcome) {
        let mut record = self.record();
        record.last_started_at = Some(started_at);
        record.last_duration = Some(duration);
        record.last_outcome = Some(outcome);
        record.ticks_completed += 1;
    }

    fn record_skipped(&self) {
        self.record().ticks_skipped += 1;
    }
}

impl Default for TickMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-tick dispatch counters.
#[derive(Debug, Default)]
struct TickSummary {
    evaluated: usize,
    fired: usize,
    failed: usize,
}

/// Minute-cadence scheduler: refreshes node status, evaluates every enabled
/// schedule and dispatches due start/stop actions.
pub struct SchedulerEngine {
    fleet: FleetHandle,
    cadence: Duration,
    clock: ClockMode,
}

impl SchedulerEngine {
    pub fn new(fleet: FleetHandle, cadence: Duration, clock: ClockMode) -> Self {
        Self {
            fleet,
            cadence,
            clock,
        }
    }

    pub fn from_config(fleet: FleetHandle, config: &SchedulerConfig) -> Self {
        Self::new(
            fleet,
            Duration::from_secs(config.tick_interval_secs.max(1)),
            config.clock,
        )
    }

    /// Main event loop. Ticks on cadence boundaries until `shutdown`
    /// broadcasts `true`.
    ///
    /// Every tick runs in its own task so a slow tick never holds up the
    /// timer; a tick that fires while the previous one is still running is
    /// dropped by the [`TickMonitor`] guard. Missed intervals are skipped,
    /// never replayed.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            cadence_secs = self.cadence.as_secs(),
            clock = ?self.clock,
            "scheduler engine started"
        );

        let first = tokio::time::Instant::now() + until_next_boundary(Utc::now(), self.cadence);
        let mut interval = tokio::time::interval_at(first, self.cadence);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let engine = Arc::new(self);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let engine = Arc::clone(&engine);
                    tokio::spawn(async move {
                        engine.tick().await;
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run one tick against the configured wall clock.
    pub async fn tick(&self) -> TickOutcome {
        let now = match self.clock {
            ClockMode::Local => Local::now().naive_local(),
            ClockMode::Utc => Utc::now().naive_utc(),
        };
        self.tick_at(now).await
    }

    /// Run one tick with `now` as the wall-clock instant every schedule in the
    /// tick is evaluated against.
    pub async fn tick_at(&self, now: NaiveDateTime) -> TickOutcome {
        let monitor = &self.fleet.monitor;
        let Some(_guard) = monitor.try_begin() else {
            monitor.record_skipped();
            info!("previous tick still running; tick dropped");
            return TickOutcome::Skipped;
        };

        let started_at = Utc::now();
        let started = Instant::now();

        let outcome = match self.process(now).await {
            Ok(summary) => TickOutcome::Completed {
                evaluated: summary.evaluated,
                fired: summary.fired,
                failed: summary.failed,
            },
            Err(e) => {
                error!("scheduler tick error: {e}");
                TickOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        let elapsed = started.elapsed();
        debug!(duration_ms = elapsed.as_millis() as u64, ?outcome, "tick finished");
        monitor.record_finished(started_at, elapsed, outcome.clone());
        outcome
    }

    async fn process(&self, now: NaiveDateTime) -> Result<TickSummary> {
        // Refresh first so anything read later in this tick sees fresh data.
        self.fleet.status.refresh().await;

        let machines = self.fleet.machines.scheduled_machines()?;
        let mut summary = TickSummary {
            evaluated: machines.len(),
            ..TickSummary::default()
        };

        for machine in &machines {
            for direction in due_actions(machine, now) {
                summary.fired += 1;
                info!(
                    machine_id = %machine.id,
                    name = %machine.name,
                    %direction,
                    at = %now.format("%Y-%m-%d %H:%M"),
                    "schedule due"
                );

                let outcome = self.fleet.executor.execute(machine.endpoint(direction)).await;
                if outcome.is_success() {
                    info!(machine_id = %machine.id, %direction, %outcome, "scheduled action finished");
                } else {
                    summary.failed += 1;
                    warn!(machine_id = %machine.id, %direction, %outcome, "scheduled action failed");
                }
            }
        }

        Ok(summary)
    }
}

/// Time from `now` to the next multiple of `cadence` since the Unix epoch, so
/// minute ticks land just after each wall-clock minute starts.
fn until_next_boundary(now: DateTime<Utc>, cadence: Duration) -> Duration {
    let cadence_ms = (cadence.as_millis() as i64).max(1);
    let into = now.timestamp_millis().rem_euclid(cadence_ms);
    Duration::from_millis((cadence_ms - into) as u64)
}
