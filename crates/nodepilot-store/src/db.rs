use rusqlite::Connection;

use crate::error::Result;

/// Initialise the machine-store schema in `conn`. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS machines (
            id              TEXT    NOT NULL PRIMARY KEY,
            name            TEXT    NOT NULL,
            node_id         TEXT    NOT NULL,
            start_url       TEXT    NOT NULL,
            stop_url        TEXT    NOT NULL,
            start_schedule  TEXT    NOT NULL,   -- JSON-encoded Schedule
            stop_schedule   TEXT    NOT NULL,   -- JSON-encoded Schedule
            status          TEXT    NOT NULL DEFAULT 'unknown',
            created_at      TEXT    NOT NULL,
            last_updated    TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_machines_node_id ON machines (node_id);
        ",
    )?;
    Ok(())
}
