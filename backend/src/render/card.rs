//! Composes one finished card from a template and a person record.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use common::model::record::PersonRecord;
use common::model::template::{FieldMap, TemplateConfig};
use image::RgbaImage;

use crate::render::fields;

/// A template with its background decoded, ready to stamp records.
///
/// Built once per batch from the stored [`TemplateConfig`]; the stored
/// template is never mutated by rendering.
pub struct RenderTemplate {
    pub background: RgbaImage,
    pub fields: FieldMap,
}

impl RenderTemplate {
    pub fn from_config(config: &TemplateConfig) -> Result<Self, String> {
        let encoded = config
            .background
            .as_deref()
            .ok_or_else(|| format!("template '{}' has no background image", config.id))?;
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| format!("template '{}' background is not valid base64: {}", config.id, e))?;
        let background = image::load_from_memory(&bytes)
            .map_err(|e| format!("template '{}' background cannot be decoded: {}", config.id, e))?
            .to_rgba8();
        Ok(RenderTemplate {
            background,
            fields: config.fields.clone(),
        })
    }

    pub fn width(&self) -> u32 {
        self.background.width()
    }

    pub fn height(&self) -> u32 {
        self.background.height()
    }
}

/// One rendered card, sized identically to its template. Ephemeral: the
/// packager consumes it immediately.
pub struct RenderedCard {
    pub image: RgbaImage,
    /// Stable per-record stem used for the output filename.
    pub stem: String,
}

/// Applies `record` to the template: clones the background and renders every
/// enabled field in the template's stored order.
pub fn compose_card(
    template: &RenderTemplate,
    record: &PersonRecord,
    fonts_dir: &Path,
) -> Result<RenderedCard, String> {
    let mut canvas = template.background.clone();
    for (name, config) in template.fields.iter() {
        if !config.renderable() {
            continue;
        }
        fields::render_field(&mut canvas, name, config, record, fonts_dir)?;
    }
    Ok(RenderedCard {
        image: canvas,
        stem: record.artifact_stem(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::model::template::FieldConfig;
    use image::Rgba;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn template_with_background(width: u32, height: u32, fields: FieldMap) -> TemplateConfig {
        let background = RgbaImage::from_pixel(width, height, Rgba([200, 200, 200, 255]));
        let mut png = Vec::new();
        background
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        TemplateConfig {
            id: "tpl".to_string(),
            name: "Carnet".to_string(),
            background: Some(BASE64.encode(png)),
            fields,
        }
    }

    fn record(pairs: &[(&str, &str)]) -> PersonRecord {
        PersonRecord {
            uuid: "aaaaaaaa-0000-0000-0000-000000000000".to_string(),
            values: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn background_dimensions_become_card_dimensions() {
        let tpl = template_with_background(64, 40, FieldMap::new());
        let render = RenderTemplate::from_config(&tpl).unwrap();
        let card = compose_card(&render, &record(&[]), TempDir::new().unwrap().path()).unwrap();
        assert_eq!(card.image.dimensions(), (64, 40));
    }

    #[test]
    fn template_without_background_is_rejected() {
        let tpl = TemplateConfig {
            id: "tpl".to_string(),
            name: "Carnet".to_string(),
            background: None,
            fields: FieldMap::new(),
        };
        assert!(RenderTemplate::from_config(&tpl).is_err());
    }

    #[test]
    fn garbage_background_is_rejected() {
        let tpl = TemplateConfig {
            id: "tpl".to_string(),
            name: "Carnet".to_string(),
            background: Some(BASE64.encode(b"not an image")),
            fields: FieldMap::new(),
        };
        assert!(RenderTemplate::from_config(&tpl).is_err());
    }

    #[test]
    fn disabled_fields_leave_the_background_untouched() {
        let mut fields = FieldMap::new();
        fields.insert(
            "nombre",
            FieldConfig {
                enabled: false,
                x: Some(1),
                y: Some(1),
                font_size: Some(10.0),
                ..FieldConfig::default()
            },
        );
        let tpl = template_with_background(30, 30, fields);
        let render = RenderTemplate::from_config(&tpl).unwrap();
        let card = compose_card(
            &render,
            &record(&[("nombre", "X")]),
            TempDir::new().unwrap().path(),
        )
        .unwrap();
        assert!(card.image.pixels().all(|p| *p == Rgba([200, 200, 200, 255])));
    }

    #[test]
    fn missing_record_values_do_not_error() {
        let mut fields = FieldMap::new();
        fields.insert(
            "nombre",
            FieldConfig {
                x: Some(1),
                y: Some(1),
                font_size: Some(10.0),
                ..FieldConfig::default()
            },
        );
        let tpl = template_with_background(30, 30, fields);
        let render = RenderTemplate::from_config(&tpl).unwrap();
        assert!(compose_card(&render, &record(&[]), TempDir::new().unwrap().path()).is_ok());
    }
}
