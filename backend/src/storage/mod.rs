//! SQLite persistence: template configurations and the read-only view of
//! person records. Connections are opened per call against the configured
//! database file, the same way the rest of the storage-facing services do.

pub mod records;
pub mod templates;

use rusqlite::Connection;

use crate::config;

pub fn open() -> Result<Connection, String> {
    Connection::open(config::db_path()).map_err(|e| e.to_string())
}

/// Creates the schema on first start. Idempotent.
pub fn ensure_schema(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS templates (
             id         TEXT PRIMARY KEY,
             name       TEXT NOT NULL,
             background TEXT,
             fields     TEXT NOT NULL,
             active     INTEGER NOT NULL DEFAULT 0,
             created_at TEXT NOT NULL DEFAULT (datetime('now'))
         );
         CREATE TABLE IF NOT EXISTS records (
             uuid TEXT PRIMARY KEY,
             data TEXT NOT NULL
         );",
    )
    .map_err(|e| e.to_string())
}

#[cfg(test)]
pub(crate) fn open_in_memory() -> Connection {
    let conn = Connection::open_in_memory().expect("in-memory sqlite");
    ensure_schema(&conn).expect("schema");
    conn
}
