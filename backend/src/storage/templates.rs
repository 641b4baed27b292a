//! Template persistence.
//!
//! Rows are never deleted: activating a template flips the `active` flag in
//! one transaction, leaving the previous active row as immutable history.

use common::model::template::TemplateConfig;
use log::info;
use rusqlite::{Connection, OptionalExtension, params};

pub fn save_template(conn: &Connection, template: &TemplateConfig) -> Result<(), String> {
    if template.id.trim().is_empty() {
        return Err("El id del template no puede estar vacío".to_string());
    }
    let fields_json = serde_json::to_string(&template.fields).map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT OR REPLACE INTO templates (id, name, background, fields, active)
         VALUES (?1, ?2, ?3, ?4,
                 COALESCE((SELECT active FROM templates WHERE id = ?1), 0))",
        params![
            &template.id,
            &template.name,
            &template.background,
            &fields_json
        ],
    )
    .map_err(|e| e.to_string())?;
    Ok(())
}

fn row_to_template(row: &rusqlite::Row) -> rusqlite::Result<(String, String, Option<String>, String)> {
    Ok((
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, Option<String>>(2)?,
        row.get::<_, String>(3)?,
    ))
}

fn assemble(
    parts: (String, String, Option<String>, String),
) -> Result<TemplateConfig, String> {
    let (id, name, background, fields_json) = parts;
    let fields = serde_json::from_str(&fields_json)
        .map_err(|e| format!("template '{id}' has corrupt field config: {e}"))?;
    Ok(TemplateConfig {
        id,
        name,
        background,
        fields,
    })
}

pub fn get_template(conn: &Connection, template_id: &str) -> Result<TemplateConfig, String> {
    let parts = conn
        .query_row(
            "SELECT id, name, background, fields FROM templates WHERE id = ?1",
            params![template_id],
            row_to_template,
        )
        .optional()
        .map_err(|e| e.to_string())?
        .ok_or("Template not found")?;
    assemble(parts)
}

/// The currently active template, if any.
pub fn get_active(conn: &Connection) -> Result<Option<TemplateConfig>, String> {
    let parts = conn
        .query_row(
            "SELECT id, name, background, fields FROM templates WHERE active = 1 LIMIT 1",
            [],
            row_to_template,
        )
        .optional()
        .map_err(|e| e.to_string())?;
    parts.map(assemble).transpose()
}

/// Makes `template_id` the single active template. Deactivation and
/// activation commit together or not at all.
pub fn activate(conn: &Connection, template_id: &str) -> Result<(), String> {
    conn.execute_batch("BEGIN").map_err(|e| e.to_string())?;
    let result = (|| -> Result<(), String> {
        conn.execute("UPDATE templates SET active = 0 WHERE active = 1", [])
            .map_err(|e| e.to_string())?;
        let changed = conn
            .execute(
                "UPDATE templates SET active = 1 WHERE id = ?1",
                params![template_id],
            )
            .map_err(|e| e.to_string())?;
        if changed == 0 {
            return Err("Template not found".to_string());
        }
        Ok(())
    })();
    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT").map_err(|e| e.to_string())?;
            info!("template {template_id} is now active");
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::open_in_memory;
    use common::model::template::{FieldConfig, FieldMap};

    fn template(id: &str) -> TemplateConfig {
        let mut fields = FieldMap::new();
        fields.insert(
            "nombre",
            FieldConfig {
                x: Some(10),
                y: Some(20),
                font_size: Some(14.0),
                ..FieldConfig::default()
            },
        );
        TemplateConfig {
            id: id.to_string(),
            name: format!("Plantilla {id}"),
            background: Some("aGVsbG8=".to_string()),
            fields,
        }
    }

    #[test]
    fn save_and_get_round_trip() {
        let conn = open_in_memory();
        save_template(&conn, &template("t1")).unwrap();
        let loaded = get_template(&conn, "t1").unwrap();
        assert_eq!(loaded.name, "Plantilla t1");
        assert_eq!(loaded.fields.len(), 1);
        assert!(loaded.fields.get("nombre").is_some());
    }

    #[test]
    fn empty_id_is_rejected() {
        let conn = open_in_memory();
        assert!(save_template(&conn, &template("  ")).is_err());
    }

    #[test]
    fn activation_is_exclusive_and_keeps_history() {
        let conn = open_in_memory();
        save_template(&conn, &template("t1")).unwrap();
        save_template(&conn, &template("t2")).unwrap();

        activate(&conn, "t1").unwrap();
        assert_eq!(get_active(&conn).unwrap().unwrap().id, "t1");

        activate(&conn, "t2").unwrap();
        assert_eq!(get_active(&conn).unwrap().unwrap().id, "t2");

        // The previous template is deactivated, not deleted.
        assert!(get_template(&conn, "t1").is_ok());

        let active_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM templates WHERE active = 1", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(active_count, 1);
    }

    #[test]
    fn activating_unknown_template_fails() {
        let conn = open_in_memory();
        save_template(&conn, &template("t1")).unwrap();
        activate(&conn, "t1").unwrap();
        assert!(activate(&conn, "missing").is_err());
        // The previous activation survives the failed attempt.
        assert_eq!(get_active(&conn).unwrap().unwrap().id, "t1");
    }

    #[test]
    fn no_active_template_reads_as_none() {
        let conn = open_in_memory();
        save_template(&conn, &template("t1")).unwrap();
        assert!(get_active(&conn).unwrap().is_none());
    }

    #[test]
    fn resave_preserves_active_flag() {
        let conn = open_in_memory();
        save_template(&conn, &template("t1")).unwrap();
        activate(&conn, "t1").unwrap();
        save_template(&conn, &template("t1")).unwrap();
        assert_eq!(get_active(&conn).unwrap().unwrap().id, "t1");
    }
}
