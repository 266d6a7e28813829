use std::sync::Arc;

use nodepilot_core::types::{Direction, Machine};
use nodepilot_store::MachineStore;
use tracing::info;

use crate::{
    engine::TickMonitor,
    error::{Result, SchedulerError},
    executor::ActionExecutor,
    status::StatusCache,
    types::{ApiHealth, Outcome, StatusSnapshot, TickStats},
};

/// Read access to the machines the scheduler acts on.
pub trait MachineSource: Send + Sync {
    /// Machines with at least one enabled schedule.
    fn scheduled_machines(&self) -> Result<Vec<Machine>>;

    fn machine(&self, id: &str) -> Result<Option<Machine>>;
}

impl MachineSource for MachineStore {
    fn scheduled_machines(&self) -> Result<Vec<Machine>> {
        Ok(self.scheduled()?)
    }

    fn machine(&self, id: &str) -> Result<Option<Machine>> {
        Ok(self.get(id)?)
    }
}

/// Shared handle to the scheduling core, cloned into the engine loop and the
/// HTTP layer alike.
#[derive(Clone)]
pub struct FleetHandle {
    pub(crate) machines: Arc<dyn MachineSource>,
    pub(crate) status: Arc<StatusCache>,
    pub(crate) executor: Arc<ActionExecutor>,
    pub(crate) monitor: Arc<TickMonitor>,
}

impl FleetHandle {
    pub fn new(
        machines: Arc<dyn MachineSource>,
        status: Arc<StatusCache>,
        executor: Arc<ActionExecutor>,
    ) -> Self {
        Self {
            machines,
            status,
            executor,
            monitor: Arc::new(TickMonitor::new()),
        }
    }

    /// Cached node statuses and API health. Never triggers a poll.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    pub fn api_health(&self) -> ApiHealth {
        self.status.health()
    }

    pub fn tick_stats(&self) -> TickStats {
        self.monitor.stats()
    }

    pub fn status_cache(&self) -> &Arc<StatusCache> {
        &self.status
    }

    pub fn monitor(&self) -> &TickMonitor {
        &self.monitor
    }

    /// Manual override: run the start or stop action of one machine now,
    /// independently of its schedules and of the scheduler loop.
    ///
    /// Not serialised against a scheduled action for the same machine.
    pub async fn trigger(&self, id: &str, direction: Direction) -> Result<Outcome> {
        let machine = self
            .machines
            .machine(id)?
            .ok_or_else(|| SchedulerError::MachineNotFound { id: id.to_string() })?;

        let url = machine.endpoint(direction);
        if url.trim().is_empty() {
            return Err(SchedulerError::MissingEndpoint {
                id: id.to_string(),
                direction,
            });
        }

        info!(machine_id = %machine.id, name = %machine.name, %direction, "manual trigger");
        let outcome = self.executor.execute(url).await;
        info!(machine_id = %machine.id, %direction, %outcome, "manual trigger finished");
        Ok(outcome)
    }
}
