use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use nodepilot_core::types::{Machine, MachineDetails, MachineId, Schedule};
use rusqlite::{types::Type, Connection, OptionalExtension};
use tracing::{info, warn};

use crate::db::init_db;
use crate::error::{Result, StoreError};

/// Column order shared by every SELECT in this module; see [`row_to_machine`].
const MACHINE_SELECT_SQL: &str = "SELECT id, name, node_id, start_url, stop_url,
        start_schedule, stop_schedule, status, last_updated
     FROM machines";

/// Thread-safe machine repository backed by a single SQLite connection.
pub struct MachineStore {
    db: Mutex<Connection>,
}

impl MachineStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// In-memory store, used by tests and throwaway runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a half-applied write
        // behind: every mutation is a single statement.
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a new machine with both schedules disabled.
    pub fn create(&self, details: MachineDetails) -> Result<Machine> {
        details.validate()?;
        let now = Utc::now();
        let machine = Machine {
            id: MachineId::new(),
            name: details.name,
            node_id: details.node_id,
            start_url: details.start_url,
            stop_url: details.stop_url,
            start_schedule: Schedule::default(),
            stop_schedule: Schedule::default(),
            status: "unknown".to_string(),
            last_updated: now,
        };

        let now_str = now.to_rfc3339();
        self.conn().execute(
            "INSERT INTO machines
             (id, name, node_id, start_url, stop_url, start_schedule, stop_schedule,
              status, created_at, last_updated)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?9)",
            rusqlite::params![
                machine.id.as_str(),
                machine.name,
                machine.node_id,
                machine.start_url,
                machine.stop_url,
                encode_schedule(&machine.start_schedule)?,
                encode_schedule(&machine.stop_schedule)?,
                machine.status,
                now_str,
            ],
        )?;

        info!(machine_id = %machine.id, name = %machine.name, "machine created");
        Ok(machine)
    }

    /// All machines in creation order.
    pub fn list(&self) -> Result<Vec<Machine>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{MACHINE_SELECT_SQL} ORDER BY created_at, id"))?;
        let machines = stmt
            .query_map([], row_to_machine)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(machines)
    }

    pub fn get(&self, id: &str) -> Result<Option<Machine>> {
        let conn = self.conn();
        let machine = conn
            .query_row(
                &format!("{MACHINE_SELECT_SQL} WHERE id = ?1"),
                [id],
                row_to_machine,
            )
            .optional()?;
        Ok(machine)
    }

    /// Machines with at least one enabled schedule, in creation order.
    pub fn scheduled(&self) -> Result<Vec<Machine>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "{MACHINE_SELECT_SQL}
             WHERE json_extract(start_schedule, '$.enabled') = 1
                OR json_extract(stop_schedule, '$.enabled') = 1
             ORDER BY created_at, id"
        ))?;
        // An undecodable row is skipped so the rest of the fleet still runs.
        let machines = stmt
            .query_map([], row_to_machine)?
            .filter_map(|r| match r {
                Ok(machine) => Some(machine),
                Err(e) => {
                    warn!("skipping unreadable machine row: {e}");
                    None
                }
            })
            .collect();
        Ok(machines)
    }

    /// Replace name, node reference and endpoints. Schedules are untouched.
    pub fn update_details(&self, id: &str, details: MachineDetails) -> Result<Machine> {
        details.validate()?;
        let n = self.conn().execute(
            "UPDATE machines SET name=?1, node_id=?2, start_url=?3, stop_url=?4,
              last_updated=?5
             WHERE id=?6",
            rusqlite::params![
                details.name,
                details.node_id,
                details.start_url,
                details.stop_url,
                Utc::now().to_rfc3339(),
                id,
            ],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        info!(machine_id = %id, "machine details updated");
        self.get(id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Replace both schedules after validating them.
    pub fn update_schedules(&self, id: &str, start: Schedule, stop: Schedule) -> Result<Machine> {
        start.validate()?;
        stop.validate()?;
        let n = self.conn().execute(
            "UPDATE machines SET start_schedule=?1, stop_schedule=?2, last_updated=?3
             WHERE id=?4",
            rusqlite::params![
                encode_schedule(&start)?,
                encode_schedule(&stop)?,
                Utc::now().to_rfc3339(),
                id,
            ],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        info!(
            machine_id = %id,
            start_enabled = start.enabled,
            stop_enabled = stop.enabled,
            "machine schedules updated"
        );
        self.get(id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Returns whether a row was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let n = self.conn().execute("DELETE FROM machines WHERE id = ?1", [id])?;
        if n > 0 {
            info!(machine_id = %id, "machine deleted");
        }
        Ok(n > 0)
    }
}

fn encode_schedule(schedule: &Schedule) -> Result<String> {
    serde_json::to_string(schedule).map_err(|e| StoreError::Invalid(e.into()))
}

/// Map a SELECT row (column order from MACHINE_SELECT_SQL) to a Machine.
fn row_to_machine(row: &rusqlite::Row<'_>) -> rusqlite::Result<Machine> {
    let schedule_at = |idx: usize| -> rusqlite::Result<Schedule> {
        let json: String = row.get(idx)?;
        serde_json::from_str(&json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    };
    let last_updated: String = row.get(8)?;
    let last_updated = DateTime::parse_from_rfc3339(&last_updated)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;

    Ok(Machine {
        id: MachineId(row.get(0)?),
        name: row.get(1)?,
        node_id: row.get(2)?,
        start_url: row.get(3)?,
        stop_url: row.get(4)?,
        start_schedule: schedule_at(5)?,
        stop_schedule: schedule_at(6)?,
        status: row.get(7)?,
        last_updated,
    })
}
