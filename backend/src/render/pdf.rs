//! Packages a rendered card into a single-page PDF of exact physical size.
//!
//! The page matches the card pixel-for-pixel at the nominal print DPI
//! (`mm = px / dpi * 25.4`), with the raster embedded full bleed. If PDF
//! encoding fails for any reason (most commonly: no TTF fonts installed for
//! the document setup), the raw PNG is written under the same stem instead —
//! the orchestrator always receives exactly one artifact per record.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use genpdf::{Document, SimplePageDecorator, Size};
use image::DynamicImage;
use log::warn;
use png::{BitDepth as PngBitDepth, ColorType as PngColorType, Encoder as PngEncoder};
use tempfile::NamedTempFile;

use crate::render::card::RenderedCard;

fn px_to_mm(px: u32, dpi: f64) -> f64 {
    px as f64 / dpi * 25.4
}

/// Loads the font family the PDF document is configured with. Text never
/// reaches the page (the card raster already contains it), but the document
/// setup requires a font.
fn load_font_family(
    fonts_dir: &Path,
) -> Result<genpdf::fonts::FontFamily<genpdf::fonts::FontData>, Box<dyn Error>> {
    if let Ok(family) = genpdf::fonts::from_files(fonts_dir, "Arial", None) {
        return Ok(family);
    }
    genpdf::fonts::from_files(fonts_dir, "LiberationSans", None).map_err(Into::into)
}

/// Writes the card raster to a temporary PNG the PDF embedder can read.
fn write_temp_png(card: &RenderedCard) -> Result<NamedTempFile, Box<dyn Error>> {
    let rgb = DynamicImage::ImageRgba8(card.image.clone()).to_rgb8();
    let (width, height) = rgb.dimensions();
    let raw = rgb.into_raw();

    let mut tmp = NamedTempFile::new()?;
    {
        let file = tmp.as_file_mut();
        let mut encoder = PngEncoder::new(file, width, height);
        encoder.set_color(PngColorType::Rgb);
        encoder.set_depth(PngBitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&raw)?;
    }
    Ok(tmp)
}

fn write_pdf(
    card: &RenderedCard,
    output: &Path,
    fonts_dir: &Path,
    dpi: f64,
) -> Result<(), Box<dyn Error>> {
    let family = load_font_family(fonts_dir)?;
    let mut doc = Document::new(family);
    doc.set_title(format!("carnet {}", card.stem));
    doc.set_paper_size(Size::new(
        px_to_mm(card.image.width(), dpi),
        px_to_mm(card.image.height(), dpi),
    ));

    // Full bleed: zero margins, image dpi equal to the page conversion dpi.
    let mut decorator = SimplePageDecorator::new();
    decorator.set_margins(0);
    doc.set_page_decorator(decorator);

    let tmp = write_temp_png(card)?;
    let mut image = genpdf::elements::Image::from_path(tmp.path())?;
    image.set_dpi(dpi);
    doc.push(image);

    let mut out_file = fs::File::create(output)?;
    doc.render(&mut out_file)?;
    Ok(())
}

/// Converts `card` into exactly one artifact inside `out_dir` and returns
/// its path: `carnet_{stem}.pdf`, or `carnet_{stem}.png` when PDF encoding
/// fails (packaging degradation is a per-record success, not an error).
pub fn package_card(
    card: &RenderedCard,
    out_dir: &Path,
    fonts_dir: &Path,
    dpi: f64,
) -> Result<PathBuf, String> {
    let pdf_path = out_dir.join(format!("carnet_{}.pdf", card.stem));
    match write_pdf(card, &pdf_path, fonts_dir, dpi) {
        Ok(()) => Ok(pdf_path),
        Err(e) => {
            warn!(
                "PDF encoding failed for {} ({}); falling back to raw raster",
                card.stem, e
            );
            // A half-written PDF must not end up in the archive.
            let _ = fs::remove_file(&pdf_path);
            let png_path = out_dir.join(format!("carnet_{}.png", card.stem));
            card.image
                .save(&png_path)
                .map_err(|e| format!("raster fallback failed for {}: {}", card.stem, e))?;
            Ok(png_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn card() -> RenderedCard {
        RenderedCard {
            image: RgbaImage::from_pixel(60, 38, Rgba([0, 80, 160, 255])),
            stem: "10234567_0d1f3c88".to_string(),
        }
    }

    #[test]
    fn page_size_matches_card_at_300_dpi() {
        // 600 px at 300 dpi is exactly two inches.
        assert_eq!(px_to_mm(600, 300.0), 50.8);
        assert_eq!(px_to_mm(300, 300.0), 25.4);
    }

    #[test]
    fn packaging_always_yields_one_artifact() {
        let out = TempDir::new().unwrap();
        let fonts = TempDir::new().unwrap();
        // No fonts installed: PDF setup fails, the raster fallback kicks in.
        let path = package_card(&card(), out.path(), fonts.path(), 300.0).unwrap();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "png");
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "carnet_10234567_0d1f3c88.png"
        );

        // The fallback artifact is a decodable image identical in size.
        let decoded = image::open(&path).unwrap();
        assert_eq!(decoded.width(), 60);
        assert_eq!(decoded.height(), 38);
    }
}
