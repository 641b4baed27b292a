//! Renders one configured field onto a card canvas.
//!
//! The canvas already holds the template background; each call draws exactly
//! one field (text, photo or QR) at its configured position. Missing record
//! values are skipped silently — an identity card with an empty plate number
//! is valid output. Only a photo that exists but cannot be decoded is a
//! record-level error.

use std::path::Path;

use common::model::record::PersonRecord;
use common::model::template::{FieldConfig, FieldKind};
use image::imageops::FilterType;
use image::{ImageFormat, ImageReader, Rgba, RgbaImage, imageops};
use log::warn;

use crate::render::{fonts, qr_svg};

const DEFAULT_FONT_SIZE: f32 = 12.0;

/// Renders the field `name` of `record` onto `canvas`.
///
/// Callers are expected to have filtered with [`FieldConfig::renderable`];
/// a non-renderable field is a no-op here as well.
pub fn render_field(
    canvas: &mut RgbaImage,
    name: &str,
    config: &FieldConfig,
    record: &PersonRecord,
    fonts_dir: &Path,
) -> Result<(), String> {
    let (Some(x), Some(y)) = (config.x, config.y) else {
        return Ok(());
    };
    if !config.enabled {
        return Ok(());
    }

    match config.resolved_kind(name) {
        FieldKind::Text => {
            if let Some(value) = record.value(name) {
                draw_text(canvas, config, value, x, y, fonts_dir);
            }
            Ok(())
        }
        FieldKind::Photo => draw_photo(canvas, name, config, record, x, y),
        FieldKind::Qr => {
            draw_qr(canvas, name, config, record, x, y);
            Ok(())
        }
    }
}

fn draw_text(
    canvas: &mut RgbaImage,
    config: &FieldConfig,
    value: &str,
    x: i64,
    y: i64,
    fonts_dir: &Path,
) {
    let font = fonts::resolve(
        fonts_dir,
        config.font_family.as_deref(),
        config.font_style.as_deref(),
    );
    let px = config.font_size.unwrap_or(DEFAULT_FONT_SIZE);
    let color = parse_color(config.color.as_deref());

    // A centered field ignores its configured x and centers on the measured
    // pixel width; y is always the configured top.
    let x = if config.centered {
        let width = font.text_width(value, px);
        ((canvas.width() as f64 - width as f64) / 2.0) as i64
    } else {
        x
    };
    font.draw(canvas, value, px, x, y, color);
}

fn draw_photo(
    canvas: &mut RgbaImage,
    name: &str,
    config: &FieldConfig,
    record: &PersonRecord,
    x: i64,
    y: i64,
) -> Result<(), String> {
    let Some(path) = record.value(name) else {
        return Ok(());
    };
    let path = Path::new(path);
    if !path.is_file() {
        // No resolvable photo path: the field is skipped, not an error.
        warn!("photo '{}' does not exist; skipping field", path.display());
        return Ok(());
    }
    let Some(size) = config.size else {
        warn!("photo field '{name}' has no size configured; skipping");
        return Ok(());
    };

    let reader = ImageReader::open(path)
        .map_err(|e| format!("cannot open photo '{}': {}", path.display(), e))?
        .with_guessed_format()
        .map_err(|e| format!("cannot read photo '{}': {}", path.display(), e))?;
    match reader.format() {
        Some(ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Gif) => {}
        other => {
            return Err(format!(
                "unsupported photo format {:?} for '{}'",
                other,
                path.display()
            ));
        }
    }
    let photo = reader
        .decode()
        .map_err(|e| format!("cannot decode photo '{}': {}", path.display(), e))?;

    // Stretch to fill the square; the source aspect ratio is not preserved.
    let resized = photo.resize_exact(size, size, FilterType::Lanczos3);
    imageops::overlay(canvas, &resized.to_rgba8(), x, y);
    Ok(())
}

fn draw_qr(
    canvas: &mut RgbaImage,
    name: &str,
    config: &FieldConfig,
    record: &PersonRecord,
    x: i64,
    y: i64,
) {
    let Some(svg) = record.value(name) else {
        return;
    };
    let Some(size) = config.size else {
        warn!("QR field '{name}' has no size configured; skipping");
        return;
    };
    match qr_svg::rasterize(svg, size) {
        Some(bitmap) => imageops::overlay(canvas, &bitmap, x, y),
        // Better no QR than a blank or garbage square on a printed card.
        None => warn!("QR svg for record {} has no drawable content; skipping", record.uuid),
    }
}

/// `#RRGGBB` or `#RGB`; anything else falls back to black.
fn parse_color(raw: Option<&str>) -> Rgba<u8> {
    let black = Rgba([0, 0, 0, 255]);
    let Some(raw) = raw else {
        return black;
    };
    let hex = raw.trim().trim_start_matches('#');
    let expand = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        6 => {
            let channels = (
                expand(&hex[0..2]),
                expand(&hex[2..4]),
                expand(&hex[4..6]),
            );
            if let (Some(r), Some(g), Some(b)) = channels {
                return Rgba([r, g, b, 255]);
            }
            warn!("invalid color '{raw}'; using black");
            black
        }
        3 => {
            let channels = (
                expand(&hex[0..1]),
                expand(&hex[1..2]),
                expand(&hex[2..3]),
            );
            if let (Some(r), Some(g), Some(b)) = channels {
                return Rgba([r * 17, g * 17, b * 17, 255]);
            }
            warn!("invalid color '{raw}'; using black");
            black
        }
        _ => {
            warn!("invalid color '{raw}'; using black");
            black
        }
    }
}
