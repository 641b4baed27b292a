//! Rasterizer for the restricted SVG dialect emitted by the QR generator.
//!
//! The input is never arbitrary SVG: the generator produces either a flat
//! list of `<rect>` modules or one `<path>` per module group using only the
//! absolute commands `M`, `L`, `H`, `V` and `Z`, optionally wrapped in a
//! `<g transform="scale(..) translate(..)">`. A hand-written scanner turns
//! the document into a typed command stream and paints axis-aligned module
//! rectangles onto a square canvas; no vector-graphics crate is involved.
//!
//! Dialect contract: a `<rect>` without a `fill` attribute is painted. The
//! generator draws black modules on a white canvas and omits the fill on the
//! module rects in some of its output modes, so absence inherits "module
//! black" rather than "nothing".

use image::{Rgba, RgbaImage};
use log::warn;

const DEFAULT_VIEWBOX_EXTENT: f64 = 200.0;

const MODULE: Rgba<u8> = Rgba([0, 0, 0, 255]);
const CANVAS: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Typed command stream of the restricted dialect.
#[derive(Debug, Clone, PartialEq)]
enum SvgCommand {
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        fill: Option<String>,
    },
    MoveTo(f64, f64),
    LineTo(f64, f64),
    HLineTo(f64),
    VLineTo(f64),
    ClosePath,
}

/// Group-level transform applied to path coordinates before viewBox scaling.
#[derive(Debug, Clone, Copy)]
struct GroupTransform {
    scale: f64,
    translate: (f64, f64),
}

impl Default for GroupTransform {
    fn default() -> Self {
        GroupTransform {
            scale: 1.0,
            translate: (0.0, 0.0),
        }
    }
}

/// Rasterizes the QR SVG into a `size`×`size` bitmap.
///
/// Returns `None` when the document contains no drawable content, which the
/// caller treats as "skip this field", not as an error. A `Some` result
/// always has at least one painted module.
pub fn rasterize(svg: &str, size: u32) -> Option<RgbaImage> {
    if size == 0 {
        return None;
    }
    let (vb_w, vb_h) = view_box(svg).unwrap_or((DEFAULT_VIEWBOX_EXTENT, DEFAULT_VIEWBOX_EXTENT));
    if vb_w <= 0.0 || vb_h <= 0.0 {
        warn!("QR svg declares a degenerate viewBox ({vb_w}x{vb_h})");
        return None;
    }
    let sx = size as f64 / vb_w;
    let sy = size as f64 / vb_h;

    let mut canvas = RgbaImage::from_pixel(size, size, CANVAS);
    let mut painted = 0usize;

    for command in rect_commands(svg) {
        if let SvgCommand::Rect {
            x,
            y,
            width,
            height,
            fill,
        } = command
        {
            if fill_paints(fill.as_deref()) {
                fill_scaled_rect(&mut canvas, x, y, width, height, sx, sy);
                painted += 1;
            }
        }
    }

    if painted == 0 {
        let transform = group_transform(svg);
        for d in path_data(svg) {
            painted += paint_path(&mut canvas, &d, transform, sx, sy);
        }
    }

    if painted == 0 { None } else { Some(canvas) }
}

/// Width/height of the source coordinate space from the `viewBox` attribute.
fn view_box(svg: &str) -> Option<(f64, f64)> {
    let tag = elements(svg, "svg").into_iter().next()?;
    let raw = attr(tag, "viewBox")?;
    let nums = number_list(raw);
    if nums.len() >= 4 {
        Some((nums[2], nums[3]))
    } else {
        None
    }
}

/// All `<rect>` primitives as typed commands, document order.
fn rect_commands(svg: &str) -> Vec<SvgCommand> {
    let mut commands = Vec::new();
    for tag in elements(svg, "rect") {
        let geometry = (
            attr_num(tag, "x"),
            attr_num(tag, "y"),
            attr_num(tag, "width"),
            attr_num(tag, "height"),
        );
        if let (Some(x), Some(y), Some(width), Some(height)) = geometry {
            commands.push(SvgCommand::Rect {
                x,
                y,
                width,
                height,
                fill: attr(tag, "fill").map(str::to_string),
            });
        }
    }
    commands
}

/// Whether a rect's fill resolves to "paint this module".
///
/// Explicit black equivalents paint; an absent fill paints per the dialect
/// default documented in the module header. Anything else (the generator only
/// ever emits white here) is the canvas and is skipped.
fn fill_paints(fill: Option<&str>) -> bool {
    let Some(fill) = fill else {
        return true;
    };
    let normalized: String = fill
        .trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    matches!(
        normalized.as_str(),
        "#000000" | "black" | "#000" | "rgb(0,0,0)" | "none"
    )
}

/// Scales a source-space rectangle to the target bitmap and fills it.
/// Floor-rounded, clamped to the canvas, never smaller than 1×1.
fn fill_scaled_rect(canvas: &mut RgbaImage, x: f64, y: f64, w: f64, h: f64, sx: f64, sy: f64) {
    let px = (x * sx).floor() as i64;
    let py = (y * sy).floor() as i64;
    let pw = ((w * sx).floor() as i64).max(1);
    let ph = ((h * sy).floor() as i64).max(1);

    let x0 = px.clamp(0, canvas.width() as i64);
    let y0 = py.clamp(0, canvas.height() as i64);
    let x1 = (px + pw).clamp(0, canvas.width() as i64);
    let y1 = (py + ph).clamp(0, canvas.height() as i64);
    for yy in y0..y1 {
        for xx in x0..x1 {
            canvas.put_pixel(xx as u32, yy as u32, MODULE);
        }
    }
}

/// First group-level `scale(..)`/`translate(..)` transform, if any.
fn group_transform(svg: &str) -> GroupTransform {
    let mut transform = GroupTransform::default();
    for tag in elements(svg, "g") {
        let Some(raw) = attr(tag, "transform") else {
            continue;
        };
        if let Some(args) = call_args(raw, "scale") {
            if let Some(&s) = args.first() {
                transform.scale = s;
            }
        }
        if let Some(args) = call_args(raw, "translate") {
            transform.translate = (
                args.first().copied().unwrap_or(0.0),
                args.get(1).copied().unwrap_or(0.0),
            );
        }
        break;
    }
    transform
}

/// The `d` attribute of every `<path>` element.
fn path_data(svg: &str) -> Vec<String> {
    elements(svg, "path")
        .into_iter()
        .filter_map(|tag| attr(tag, "d").map(str::to_string))
        .collect()
}

/// Parses one `d` attribute and paints its polygons. Returns the number of
/// modules painted.
///
/// The walk keeps a current point; `M` closes and paints any in-progress
/// polygon before starting the next one, `Z` closes and paints explicitly,
/// and a trailing open polygon is painted like an implicit close. "Painting"
/// a polygon fills its axis-aligned bounding box — QR modules are axis
/// aligned, so the bbox is the module shape.
fn paint_path(
    canvas: &mut RgbaImage,
    d: &str,
    transform: GroupTransform,
    sx: f64,
    sy: f64,
) -> usize {
    let mut painted = 0usize;
    let mut current = (0.0f64, 0.0f64);
    let mut polygon: Vec<(f64, f64)> = Vec::new();

    for command in parse_path(d) {
        match command {
            SvgCommand::MoveTo(x, y) => {
                painted += flush_polygon(canvas, &polygon, transform, sx, sy);
                polygon.clear();
                current = (x, y);
                polygon.push(current);
            }
            SvgCommand::LineTo(x, y) => {
                current = (x, y);
                polygon.push(current);
            }
            SvgCommand::HLineTo(x) => {
                current.0 = x;
                polygon.push(current);
            }
            SvgCommand::VLineTo(y) => {
                current.1 = y;
                polygon.push(current);
            }
            SvgCommand::ClosePath => {
                painted += flush_polygon(canvas, &polygon, transform, sx, sy);
                polygon.clear();
            }
            SvgCommand::Rect { .. } => unreachable!("rects are not path commands"),
        }
    }
    painted += flush_polygon(canvas, &polygon, transform, sx, sy);
    painted
}

/// Paints the bounding box of a polygon with at least three points.
fn flush_polygon(
    canvas: &mut RgbaImage,
    polygon: &[(f64, f64)],
    transform: GroupTransform,
    sx: f64,
    sy: f64,
) -> usize {
    if polygon.len() < 3 {
        return 0;
    }
    let mut min = polygon[0];
    let mut max = polygon[0];
    for &(x, y) in polygon {
        min.0 = min.0.min(x);
        min.1 = min.1.min(y);
        max.0 = max.0.max(x);
        max.1 = max.1.max(y);
    }
    let x = min.0 * transform.scale + transform.translate.0;
    let y = min.1 * transform.scale + transform.translate.1;
    let w = (max.0 - min.0) * transform.scale;
    let h = (max.1 - min.1) * transform.scale;
    fill_scaled_rect(canvas, x, y, w, h, sx, sy);
    1
}

// ---- dialect scanner ----------------------------------------------------

/// Slices of every `<name ...>` tag body (between `<name` and `>`).
fn elements<'a>(svg: &'a str, name: &str) -> Vec<&'a str> {
    let open = format!("<{name}");
    let mut tags = Vec::new();
    let mut rest = svg;
    while let Some(pos) = rest.find(&open) {
        let after = &rest[pos + open.len()..];
        // Boundary check so "<g" does not match "<glyph".
        let boundary = after
            .chars()
            .next()
            .map(|c| !c.is_ascii_alphanumeric())
            .unwrap_or(true);
        if boundary {
            let end = after.find('>').unwrap_or(after.len());
            tags.push(&after[..end]);
            rest = &after[end..];
        } else {
            rest = after;
        }
    }
    tags
}

/// Value of `name="..."` (or single-quoted) inside one tag body.
fn attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let bytes = tag.as_bytes();
    let mut from = 0;
    while let Some(pos) = tag[from..].find(name) {
        let start = from + pos;
        let preceded_ok = start == 0 || bytes[start - 1].is_ascii_whitespace();
        let mut rest = tag[start + name.len()..].trim_start();
        if preceded_ok && rest.starts_with('=') {
            rest = rest[1..].trim_start();
            let quote = rest.chars().next()?;
            if quote == '"' || quote == '\'' {
                let value = &rest[1..];
                let end = value.find(quote)?;
                return Some(&value[..end]);
            }
        }
        from = start + name.len();
    }
    None
}

fn attr_num(tag: &str, name: &str) -> Option<f64> {
    attr(tag, name).and_then(|v| v.trim().parse().ok())
}

/// Whitespace/comma separated numbers (viewBox, transform arguments).
fn number_list(raw: &str) -> Vec<f64> {
    raw.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

/// Arguments of `func(...)` inside a transform attribute.
fn call_args(transform: &str, func: &str) -> Option<Vec<f64>> {
    let start = transform.find(func)? + func.len();
    let rest = transform[start..].trim_start();
    let inner = rest.strip_prefix('(')?;
    let end = inner.find(')')?;
    Some(number_list(&inner[..end]))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PathToken {
    Letter(char),
    Number(f64),
}

/// Lexes a `d` attribute. The generator packs numbers against command
/// letters and against each other ("M0 0L25 0 25 25Z", "H25V25"); scanning
/// characters instead of splitting on separators handles every packing.
fn lex_path(d: &str) -> Vec<PathToken> {
    let bytes = d.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_alphabetic() {
            tokens.push(PathToken::Letter(c));
            i += 1;
        } else if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' {
            let start = i;
            i += 1;
            let mut seen_dot = c == '.';
            while i < bytes.len() {
                let n = bytes[i] as char;
                if n.is_ascii_digit() {
                    i += 1;
                } else if n == '.' && !seen_dot {
                    seen_dot = true;
                    i += 1;
                } else {
                    break;
                }
            }
            if let Ok(value) = d[start..i].parse() {
                tokens.push(PathToken::Number(value));
            }
        } else {
            i += 1;
        }
    }
    tokens
}

/// Parses a `d` attribute into the typed command stream.
///
/// Chained coordinate pairs expand into one command each; the pairs after an
/// `M` are implicit `L`s. Commands outside the dialect are warned about and
/// skipped together with their arguments.
fn parse_path(d: &str) -> Vec<SvgCommand> {
    let tokens = lex_path(d);
    let mut commands = Vec::new();
    let mut i = 0;

    let number = |tokens: &[PathToken], i: usize| -> Option<f64> {
        match tokens.get(i) {
            Some(PathToken::Number(n)) => Some(*n),
            _ => None,
        }
    };

    while i < tokens.len() {
        let PathToken::Letter(letter) = tokens[i] else {
            // Stray number without a command; not part of the dialect.
            i += 1;
            continue;
        };
        i += 1;
        match letter {
            'M' | 'L' => {
                let mut first = true;
                while let (Some(x), Some(y)) = (number(&tokens, i), number(&tokens, i + 1)) {
                    if letter == 'M' && first {
                        commands.push(SvgCommand::MoveTo(x, y));
                    } else {
                        commands.push(SvgCommand::LineTo(x, y));
                    }
                    first = false;
                    i += 2;
                }
            }
            'H' => {
                while let Some(x) = number(&tokens, i) {
                    commands.push(SvgCommand::HLineTo(x));
                    i += 1;
                }
            }
            'V' => {
                while let Some(y) = number(&tokens, i) {
                    commands.push(SvgCommand::VLineTo(y));
                    i += 1;
                }
            }
            'Z' | 'z' => commands.push(SvgCommand::ClosePath),
            other => {
                warn!("QR svg path uses '{other}', outside the supported dialect; skipping");
                while number(&tokens, i).is_some() {
                    i += 1;
                }
            }
        }
    }
    commands
}
