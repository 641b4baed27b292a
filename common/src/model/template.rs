//! Card template configuration shared between the API surface and the
//! rendering backend.
//!
//! A template is a background image plus a set of positioned fields. The
//! persisted shape of the field set is a JSON object mapping field name to
//! its configuration; the key order of that object is the template's stored
//! rendering order, so `FieldMap` preserves it instead of using a hash map.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// What a field draws onto the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Photo,
    Qr,
}

/// Configuration of one positioned field inside a template.
///
/// All coordinates are in template pixel space with a top-left anchor.
/// `size` is the square side length for photo and QR fields; text fields use
/// `font_size` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FieldKind>,
    pub enabled: bool,
    pub x: Option<i64>,
    pub y: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_style: Option<String>,
    pub centered: bool,
}

impl Default for FieldConfig {
    fn default() -> Self {
        FieldConfig {
            kind: None,
            // A field present in the map is enabled unless it says otherwise.
            enabled: true,
            x: None,
            y: None,
            size: None,
            font_size: None,
            color: None,
            font_family: None,
            font_style: None,
            centered: false,
        }
    }
}

impl FieldConfig {
    /// The effective kind of the field named `name`.
    ///
    /// Older template editors do not persist `kind`; for those the kind is
    /// derived from the field name ("foto"/"photo" and "qr" are reserved
    /// name fragments, everything else is text).
    pub fn resolved_kind(&self, name: &str) -> FieldKind {
        if let Some(kind) = self.kind {
            return kind;
        }
        let name = name.to_lowercase();
        if name.contains("foto") || name.contains("photo") {
            FieldKind::Photo
        } else if name.contains("qr") {
            FieldKind::Qr
        } else {
            FieldKind::Text
        }
    }

    /// A field with `enabled = false` or without both coordinates is never
    /// rendered.
    pub fn renderable(&self) -> bool {
        self.enabled && self.x.is_some() && self.y.is_some()
    }
}

/// Ordered field-name → `FieldConfig` mapping.
///
/// Serialized as a plain JSON object; entries keep document order on both
/// serialization and deserialization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap(Vec<(String, FieldConfig)>);

impl FieldMap {
    pub fn new() -> Self {
        FieldMap(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&FieldConfig> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    /// Appends the field, or replaces it in place if the name already exists.
    pub fn insert(&mut self, name: impl Into<String>, config: FieldConfig) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = config,
            None => self.0.push((name, config)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldConfig)> {
        self.0.iter().map(|(n, c)| (n.as_str(), c))
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, config) in &self.0 {
            map.serialize_entry(name, config)?;
        }
        map.end()
    }
}

struct FieldMapVisitor;

impl<'de> Visitor<'de> for FieldMapVisitor {
    type Value = FieldMap;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON object mapping field names to field configs")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldMap, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, config)) = access.next_entry::<String, FieldConfig>()? {
            entries.push((name, config));
        }
        Ok(FieldMap(entries))
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<FieldMap, D::Error> {
        deserializer.deserialize_map(FieldMapVisitor)
    }
}

/// A reusable card template: background image plus positioned fields.
///
/// `background` holds the base64-encoded image bytes as stored in the
/// database; the pixel dimensions are not persisted, they derive from
/// decoding the background. Exactly one template is active at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default)]
    pub fields: FieldMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_map_preserves_document_order() {
        let json = r#"{
            "nombre": {"enabled": true, "x": 10, "y": 20, "fontSize": 14.0},
            "cedula": {"enabled": true, "x": 10, "y": 40, "fontSize": 12.0},
            "foto":   {"enabled": true, "x": 400, "y": 20, "size": 120},
            "qr":     {"enabled": true, "x": 400, "y": 200, "size": 90}
        }"#;
        let map: FieldMap = serde_json::from_str(json).unwrap();
        let names: Vec<&str> = map.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["nombre", "cedula", "foto", "qr"]);

        let back = serde_json::to_string(&map).unwrap();
        let reparsed: FieldMap = serde_json::from_str(&back).unwrap();
        assert_eq!(map, reparsed);
    }

    #[test]
    fn kind_is_inferred_from_name_when_absent() {
        let cfg = FieldConfig::default();
        assert_eq!(cfg.resolved_kind("nombre"), FieldKind::Text);
        assert_eq!(cfg.resolved_kind("foto_conductor"), FieldKind::Photo);
        assert_eq!(cfg.resolved_kind("PhotoOwner"), FieldKind::Photo);
        assert_eq!(cfg.resolved_kind("codigo_qr"), FieldKind::Qr);

        let explicit = FieldConfig {
            kind: Some(FieldKind::Text),
            ..FieldConfig::default()
        };
        assert_eq!(explicit.resolved_kind("qr"), FieldKind::Text);
    }

    #[test]
    fn disabled_or_unplaced_fields_are_not_renderable() {
        let mut cfg = FieldConfig {
            x: Some(5),
            y: Some(5),
            ..FieldConfig::default()
        };
        assert!(cfg.renderable());

        cfg.enabled = false;
        assert!(!cfg.renderable());

        cfg.enabled = true;
        cfg.y = None;
        assert!(!cfg.renderable());
    }

    #[test]
    fn missing_enabled_defaults_to_true() {
        let cfg: FieldConfig = serde_json::from_str(r#"{"x": 1, "y": 2}"#).unwrap();
        assert!(cfg.enabled);
        assert!(cfg.renderable());
    }
}
