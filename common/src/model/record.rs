use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One person record as supplied by the external record source.
///
/// The record is an opaque key→value map; the renderer looks values up by the
/// template's field names. Well-known keys are `nombre`, `cedula`, vehicle
/// data, a photo field whose value is a filesystem path, and a QR field whose
/// value is the SVG emitted by the QR generator for the record's URL. This
/// subsystem never writes records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonRecord {
    pub uuid: String,
    #[serde(default)]
    pub values: HashMap<String, String>,
}

impl PersonRecord {
    /// Returns the trimmed value for `key`, or `None` when absent or blank.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Stem used to name this record's output artifact.
    ///
    /// Combines the document number with a uuid prefix so that filenames stay
    /// unique across re-imports of the same person; a bare auto-increment id
    /// would collide.
    pub fn artifact_stem(&self) -> String {
        let uuid_part: String = self.uuid.chars().filter(|c| *c != '-').take(8).collect();
        let document = self
            .value("cedula")
            .or_else(|| self.value("documento"))
            .or_else(|| self.value("document"));
        match document {
            Some(doc) => format!("{}_{}", sanitize(doc), uuid_part),
            None if uuid_part.is_empty() => "registro".to_string(),
            None => uuid_part,
        }
    }
}

/// Keeps alphanumerics, maps everything else to `_` so the stem is safe as a
/// filename on any filesystem.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
