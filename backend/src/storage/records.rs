//! Read-only view of person records.
//!
//! Records are imported by an external subsystem; the batch pipeline only
//! ever reads them. Each row stores the record's opaque key→value map as a
//! JSON object.

use std::collections::HashMap;

use common::model::record::PersonRecord;
use log::warn;
use rusqlite::Connection;

/// Loads every record. Rows with corrupt JSON are skipped with a warning
/// instead of failing the whole load.
pub fn load_all(conn: &Connection) -> Result<Vec<PersonRecord>, String> {
    let mut stmt = conn
        .prepare("SELECT uuid, data FROM records ORDER BY uuid")
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|e| e.to_string())?;

    let mut records = Vec::new();
    for row in rows {
        let (uuid, data) = row.map_err(|e| e.to_string())?;
        match serde_json::from_str::<HashMap<String, String>>(&data) {
            Ok(values) => records.push(PersonRecord { uuid, values }),
            Err(e) => warn!("record {uuid} has corrupt data, skipping: {e}"),
        }
    }
    Ok(records)
}
