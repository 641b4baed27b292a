//! The card rendering engine: restricted-SVG QR rasterization, font
//! resolution, per-field drawing, card composition and PDF packaging.

pub mod card;
pub mod fields;
pub mod fonts;
pub mod pdf;
pub mod qr_svg;
