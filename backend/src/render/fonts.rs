//! Font resolution for text fields.
//!
//! Template fields reference fonts by family and style. Resolution walks a
//! fixed table of TTF filenames under the configured fonts directory and
//! degrades gracefully: exact style, then the family's regular weight, then
//! the default family, and finally a built-in 5×7 bitmap font that always
//! succeeds. Cards keep rendering on machines with no fonts installed; the
//! output is just uglier.

use std::fs;
use std::path::Path;

use image::{Rgba, RgbaImage};
use log::debug;
use rusttype::{Font, Scale, point};

/// Style axis resolved against the font table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl FontStyle {
    pub fn parse(raw: Option<&str>) -> FontStyle {
        let normalized: String = raw
            .unwrap_or("")
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        match normalized.as_str() {
            "bold" => FontStyle::Bold,
            "italic" | "oblique" => FontStyle::Italic,
            "bolditalic" | "italicbold" => FontStyle::BoldItalic,
            _ => FontStyle::Regular,
        }
    }
}

const DEFAULT_FAMILY: &str = "liberationsans";

/// (normalized family, style) → filename under the fonts directory.
const FONT_TABLE: &[(&str, FontStyle, &str)] = &[
    ("arial", FontStyle::Regular, "Arial.ttf"),
    ("arial", FontStyle::Bold, "Arial-Bold.ttf"),
    ("arial", FontStyle::Italic, "Arial-Italic.ttf"),
    ("arial", FontStyle::BoldItalic, "Arial-BoldItalic.ttf"),
    (
        "liberationsans",
        FontStyle::Regular,
        "LiberationSans-Regular.ttf",
    ),
    ("liberationsans", FontStyle::Bold, "LiberationSans-Bold.ttf"),
    (
        "liberationsans",
        FontStyle::Italic,
        "LiberationSans-Italic.ttf",
    ),
    (
        "liberationsans",
        FontStyle::BoldItalic,
        "LiberationSans-BoldItalic.ttf",
    ),
    ("dejavusans", FontStyle::Regular, "DejaVuSans.ttf"),
    ("dejavusans", FontStyle::Bold, "DejaVuSans-Bold.ttf"),
];

/// A font usable for measuring and drawing, whatever the fallback chain
/// ended up with.
pub enum ResolvedFont {
    Ttf(Font<'static>),
    Builtin,
}

fn normalize_family(family: &str) -> String {
    family
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

fn load_table_font(fonts_dir: &Path, family: &str, style: FontStyle) -> Option<Font<'static>> {
    let (_, _, filename) = FONT_TABLE
        .iter()
        .find(|(f, s, _)| *f == family && *s == style)?;
    let data = fs::read(fonts_dir.join(filename)).ok()?;
    Font::try_from_vec(data)
}

/// Resolves `(family, style)` with the documented fallback chain. Never
/// fails: the built-in bitmap font is the last resort.
pub fn resolve(fonts_dir: &Path, family: Option<&str>, style: Option<&str>) -> ResolvedFont {
    let style = FontStyle::parse(style);
    let family = normalize_family(family.unwrap_or(DEFAULT_FAMILY));

    let mut candidates = vec![(family.clone(), style), (family.clone(), FontStyle::Regular)];
    if family != DEFAULT_FAMILY {
        candidates.push((DEFAULT_FAMILY.to_string(), style));
        candidates.push((DEFAULT_FAMILY.to_string(), FontStyle::Regular));
    }

    for (candidate_family, candidate_style) in candidates {
        if let Some(font) = load_table_font(fonts_dir, &candidate_family, candidate_style) {
            return ResolvedFont::Ttf(font);
        }
    }
    debug!("no TTF resolved for family '{family}'; using the built-in bitmap font");
    ResolvedFont::Builtin
}

impl ResolvedFont {
    /// Pixel width of `text` rendered at `px`.
    pub fn text_width(&self, text: &str, px: f32) -> f32 {
        match self {
            ResolvedFont::Ttf(font) => {
                let scale = Scale::uniform(px);
                let v_metrics = font.v_metrics(scale);
                let mut width = 0.0f32;
                for glyph in font.layout(text, scale, point(0.0, v_metrics.ascent)) {
                    if let Some(bb) = glyph.pixel_bounding_box() {
                        width = width.max(bb.max.x as f32);
                    }
                    width = width.max(
                        glyph.position().x + glyph.unpositioned().h_metrics().advance_width,
                    );
                }
                width
            }
            ResolvedFont::Builtin => {
                let cell = builtin_cell(px);
                let n = text.chars().count() as f32;
                if n == 0.0 {
                    0.0
                } else {
                    n * (cell * 6.0) - cell
                }
            }
        }
    }

    /// Draws `text` with its glyph-box top at `(x, y)`, alpha-blending onto
    /// the canvas.
    pub fn draw(&self, canvas: &mut RgbaImage, text: &str, px: f32, x: i64, y: i64, color: Rgba<u8>) {
        match self {
            ResolvedFont::Ttf(font) => draw_ttf(canvas, font, text, px, x, y, color),
            ResolvedFont::Builtin => draw_builtin(canvas, text, px, x, y, color),
        }
    }
}

fn draw_ttf(
    canvas: &mut RgbaImage,
    font: &Font<'static>,
    text: &str,
    px: f32,
    x: i64,
    y: i64,
    color: Rgba<u8>,
) {
    let scale = Scale::uniform(px);
    let v_metrics = font.v_metrics(scale);
    let baseline = y as f32 + v_metrics.ascent;

    for glyph in font.layout(text, scale, point(x as f32, baseline)) {
        if let Some(bb) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, coverage| {
                let px = gx as i64 + bb.min.x as i64;
                let py = gy as i64 + bb.min.y as i64;
                blend_pixel(canvas, px, py, color, coverage);
            });
        }
    }
}

fn blend_pixel(canvas: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>, coverage: f32) {
    if x < 0 || y < 0 || x >= canvas.width() as i64 || y >= canvas.height() as i64 {
        return;
    }
    let alpha = coverage.clamp(0.0, 1.0);
    if alpha <= 0.0 {
        return;
    }
    let dst = canvas.get_pixel_mut(x as u32, y as u32);
    let inv = 1.0 - alpha;
    for channel in 0..3 {
        dst.0[channel] =
            (color.0[channel] as f32 * alpha + dst.0[channel] as f32 * inv).round() as u8;
    }
    dst.0[3] = 255;
}

// ---- built-in bitmap font ------------------------------------------------

const GLYPH_COLS: u32 = 5;
const GLYPH_ROWS: u32 = 7;

/// Pixel size of one bitmap cell for the requested font size: the 7-row
/// glyph plus one row of spacing approximates the em square.
fn builtin_cell(px: f32) -> f32 {
    (px / (GLYPH_ROWS + 1) as f32).round().max(1.0)
}

fn draw_builtin(canvas: &mut RgbaImage, text: &str, px: f32, x: i64, y: i64, color: Rgba<u8>) {
    let cell = builtin_cell(px) as i64;
    let mut caret = x;
    for ch in text.chars() {
        let rows = builtin_glyph(ch);
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_COLS {
                if bits & (1 << (GLYPH_COLS - 1 - col)) != 0 {
                    for dy in 0..cell {
                        for dx in 0..cell {
                            blend_pixel(
                                canvas,
                                caret + col as i64 * cell + dx,
                                y + row as i64 * cell + dy,
                                color,
                                1.0,
                            );
                        }
                    }
                }
            }
        }
        caret += cell * (GLYPH_COLS as i64 + 1);
    }
}

/// 5×7 glyph rows, most significant bit = leftmost column. Lowercase maps to
/// uppercase; the set covers what identity cards print (uppercase letters,
/// digits, common punctuation). Unknown characters render as a box.
fn builtin_glyph(c: char) -> [u8; 7] {
    match c.to_ascii_uppercase() {
        ' ' => [0; 7],
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b11011, 0b10001],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00110, 0b01000, 0b10000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00110, 0b00110],
        ',' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00110, 0b00110, 0b01100],
        '-' => [0b00000, 0b00000, 0b00000, 0b01110, 0b00000, 0b00000, 0b00000],
        ':' => [0b00000, 0b00110, 0b00110, 0b00000, 0b00110, 0b00110, 0b00000],
        '/' => [0b00001, 0b00010, 0b00100, 0b00100, 0b01000, 0b10000, 0b00000],
        '#' => [0b01010, 0b11111, 0b01010, 0b01010, 0b01010, 0b11111, 0b01010],
        _ => [0b11111, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11111],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn style_parsing_is_lenient() {
        assert_eq!(FontStyle::parse(None), FontStyle::Regular);
        assert_eq!(FontStyle::parse(Some("Bold")), FontStyle::Bold);
        assert_eq!(FontStyle::parse(Some("bold italic")), FontStyle::BoldItalic);
        assert_eq!(FontStyle::parse(Some("ITALIC")), FontStyle::Italic);
        assert_eq!(FontStyle::parse(Some("weird")), FontStyle::Regular);
    }

    #[test]
    fn empty_fonts_dir_resolves_to_builtin() {
        let dir = TempDir::new().unwrap();
        let font = resolve(dir.path(), Some("Arial"), Some("bold"));
        assert!(matches!(font, ResolvedFont::Builtin));
    }

    #[test]
    fn unreadable_ttf_falls_through_to_builtin() {
        let dir = TempDir::new().unwrap();
        // Present but not a TTF: resolution must skip it, not crash.
        std::fs::write(dir.path().join("Arial.ttf"), b"not a font").unwrap();
        let font = resolve(dir.path(), Some("Arial"), None);
        assert!(matches!(font, ResolvedFont::Builtin));
    }

    #[test]
    fn builtin_width_scales_with_text_length() {
        let font = ResolvedFont::Builtin;
        let one = font.text_width("A", 16.0);
        let four = font.text_width("ABCD", 16.0);
        assert!(one > 0.0);
        // Four cells plus three spacings.
        assert_eq!(four, one * 4.0 + builtin_cell(16.0) * 3.0);
    }

    #[test]
    fn builtin_draw_stays_inside_canvas() {
        let mut canvas = RgbaImage::from_pixel(20, 10, Rgba([255, 255, 255, 255]));
        let font = ResolvedFont::Builtin;
        // Deliberately overflows the right edge; must not panic.
        font.draw(&mut canvas, "WWWW", 14.0, 2, 1, Rgba([0, 0, 0, 255]));
        assert!(canvas.pixels().any(|p| p.0[0] == 0));
    }
}
