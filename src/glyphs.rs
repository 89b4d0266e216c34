//! Font loading, run measurement and glyph rasterization.
//!
//! A run is laid out once per render into a coverage mask in run-local
//! coordinates (baseline origin at `(0, 0)`). The compositor then samples that
//! mask for every placement instead of re-rasterizing outlines per tile.

use std::fmt;

use ab_glyph::{point, Font, FontArc, Glyph, GlyphId, PxScale, ScaleFont};

use crate::error::{Error, Result};
use crate::layout::{Point, TextMetrics};

/// Embedded default face (DejaVu Sans, see `fonts/DejaVuSans-LICENSE.txt`).
const EMBEDDED_FONT_DATA: &[u8] = include_bytes!("fonts/DejaVuSans.ttf");

/// Largest coverage mask a run may rasterize to, in pixels (128 MiB of `f32`).
pub const MAX_MASK_PIXELS: u64 = 1 << 25;

/// A parsed font face.
#[derive(Clone)]
pub struct Typeface {
    font: FontArc,
}

impl fmt::Debug for Typeface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Typeface")
            .field("glyphs", &self.font.glyph_count())
            .finish()
    }
}

impl Typeface {
    /// The embedded default face.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FontLoad`] if the embedded data is corrupt.
    pub fn embedded() -> Result<Self> {
        let font = FontArc::try_from_slice(EMBEDDED_FONT_DATA)
            .map_err(|e| Error::FontLoad(e.to_string()))?;
        Ok(Self { font })
    }

    /// Parse TTF/OTF bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FontLoad`] if the bytes are not a usable font.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let font = FontArc::try_from_vec(data).map_err(|e| Error::FontLoad(e.to_string()))?;
        Ok(Self { font })
    }

    /// `PxScale` is ascent-to-descent height; convert from an em size.
    #[allow(clippy::cast_precision_loss)]
    fn scale(&self, font_size_px: u32) -> PxScale {
        let em = font_size_px as f32;
        match self.font.units_per_em() {
            Some(units) if units > 0.0 => PxScale::from(em * self.font.height_unscaled() / units),
            _ => PxScale::from(em),
        }
    }

    fn layout(&self, text: &str, scale: PxScale) -> (Vec<Glyph>, f32) {
        let scaled = self.font.as_scaled(scale);
        let mut glyphs = Vec::with_capacity(text.len());
        let mut cursor = 0.0_f32;
        let mut prev: Option<GlyphId> = None;

        for c in text.chars() {
            let id = scaled.glyph_id(c);
            if let Some(prev) = prev {
                cursor += scaled.kern(prev, id);
            }
            glyphs.push(id.with_scale_and_position(scale, point(cursor, 0.0)));
            cursor += scaled.h_advance(id);
            prev = Some(id);
        }

        (glyphs, cursor)
    }

    /// Advance width of `text`, with the height fixed to the font size.
    #[must_use]
    pub fn measure(&self, text: &str, font_size_px: u32) -> TextMetrics {
        let (_, width) = self.layout(text, self.scale(font_size_px));
        TextMetrics {
            width: f64::from(width),
            height: f64::from(font_size_px),
        }
    }

    /// Rasterize `text` into a coverage mask.
    ///
    /// Returns `Ok(None)` when nothing would be inked (empty or whitespace-only text).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] when the run covers more than
    /// [`MAX_MASK_PIXELS`]; nothing is allocated in that case.
    pub fn rasterize(&self, text: &str, font_size_px: u32) -> Result<Option<GlyphMask>> {
        let (glyphs, _) = self.layout(text, self.scale(font_size_px));
        let outlined: Vec<_> = glyphs
            .into_iter()
            .filter_map(|g| self.font.outline_glyph(g))
            .collect();

        let Some(first) = outlined.first().map(ab_glyph::OutlinedGlyph::px_bounds) else {
            return Ok(None);
        };
        let (mut min, mut max) = (first.min, first.max);
        for glyph in &outlined[1..] {
            let b = glyph.px_bounds();
            min.x = min.x.min(b.min.x);
            min.y = min.y.min(b.min.y);
            max.x = max.x.max(b.max.x);
            max.y = max.y.max(b.max.y);
        }

        let span_x = f64::from(max.x) - f64::from(min.x);
        let span_y = f64::from(max.y) - f64::from(min.y);
        let area = span_x * span_y;
        #[allow(clippy::cast_precision_loss)]
        let limit = MAX_MASK_PIXELS as f64;
        if !area.is_finite() || area > limit {
            return Err(Error::invalid(
                "fontSizePx",
                format!(
                    "{font_size_px}px text renders to a {span_x}x{span_y} px run, \
                     above the {MAX_MASK_PIXELS} px glyph mask limit"
                ),
            ));
        }

        // px_bounds are whole pixels
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (width, height) = ((max.x - min.x) as u32, (max.y - min.y) as u32);
        let mut coverage = vec![0.0_f32; (width as usize) * (height as usize)];

        for glyph in &outlined {
            let b = glyph.px_bounds();
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let (ox, oy) = ((b.min.x - min.x) as u32, (b.min.y - min.y) as u32);
            glyph.draw(|x, y, c| {
                let idx = ((oy + y) * width + ox + x) as usize;
                if let Some(px) = coverage.get_mut(idx) {
                    *px = (*px + c).min(1.0);
                }
            });
        }

        Ok(Some(GlyphMask {
            width,
            height,
            left: min.x,
            top: min.y,
            coverage,
        }))
    }
}

/// Anti-aliased coverage of a laid-out run.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphMask {
    width: u32,
    height: u32,
    left: f32,
    top: f32,
    coverage: Vec<f32>,
}

impl GlyphMask {
    /// Mask width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Mask height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Run-local corners of the mask: top-left and bottom-right.
    #[must_use]
    pub fn extent(&self) -> (Point, Point) {
        let (left, top) = (f64::from(self.left), f64::from(self.top));
        (
            Point::new(left, top),
            Point::new(
                left + f64::from(self.width),
                top + f64::from(self.height),
            ),
        )
    }

    /// Bilinear coverage at a run-local point. Zero outside the mask.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        // texel centers sit on half-integers
        let fx = x - self.left - 0.5;
        let fy = y - self.top - 0.5;
        let (x0, y0) = (fx.floor(), fy.floor());
        let (tx, ty) = (fx - x0, fy - y0);
        let (x0, y0) = (x0 as i64, y0 as i64);

        let (w, h) = (i64::from(self.width), i64::from(self.height));
        #[allow(clippy::cast_sign_loss)]
        let texel = |x: i64, y: i64| -> f32 {
            if x < 0 || y < 0 || x >= w || y >= h {
                0.0
            } else {
                self.coverage[(y * w + x) as usize]
            }
        };

        texel(x0, y0) * (1.0 - tx) * (1.0 - ty)
            + texel(x0 + 1, y0) * tx * (1.0 - ty)
            + texel(x0, y0 + 1) * (1.0 - tx) * ty
            + texel(x0 + 1, y0 + 1) * tx * ty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face() -> Typeface {
        Typeface::embedded().unwrap()
    }

    #[test]
    fn embedded_font_loads() {
        let face = face();
        assert!(format!("{face:?}").contains("Typeface"));
    }

    #[test]
    fn garbage_font_bytes_are_rejected() {
        let err = Typeface::from_bytes(vec![0, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::FontLoad(_)));
    }

    #[test]
    fn height_is_font_size() {
        let m = face().measure("Anything", 37);
        assert!((m.height - 37.0).abs() < f64::EPSILON);
    }

    #[test]
    fn width_grows_with_font_size_and_length() {
        let face = face();
        let w12 = face.measure("Hello", 12).width;
        let w24 = face.measure("Hello", 24).width;
        let w48 = face.measure("Hello", 48).width;
        assert!(w12 > 0.0);
        assert!(w24 > w12);
        assert!(w48 > w24);
        assert!((w48 / w24 - 2.0).abs() < 0.05);

        assert!(face.measure("Hello, world", 24).width > w24);
    }

    #[test]
    fn em_size_is_plausible() {
        // a capital run of six glyphs is a few em wide, not a few px
        let width = face().measure("SAMPLE", 40).width;
        assert!((100.0..250.0).contains(&width), "width {width}");
    }

    #[test]
    fn empty_text_measures_zero_and_has_no_mask() {
        let face = face();
        assert!(face.measure("", 40).width.abs() < f64::EPSILON);
        assert!(face.rasterize("", 40).unwrap().is_none());
        assert!(face.rasterize("   ", 40).unwrap().is_none());
    }

    #[test]
    fn mask_sits_on_the_baseline() {
        let mask = face().rasterize("Hx", 40).unwrap().unwrap();
        let (min, max) = mask.extent();

        assert!(mask.width() > 0 && mask.height() > 0);
        // capitals rise above the baseline, nothing in "Hx" descends far below
        assert!(min.y < -20.0);
        assert!(max.y <= 2.0);
        assert!(min.x >= -2.0 && min.x <= 6.0);
    }

    #[test]
    fn sample_is_zero_outside_and_inked_inside() {
        let mask = face().rasterize("H", 60).unwrap().unwrap();
        let (min, max) = mask.extent();

        #[allow(clippy::cast_possible_truncation)]
        let outside = mask.sample((max.x + 10.0) as f32, (min.y - 10.0) as f32);
        assert!(outside.abs() < f32::EPSILON);

        let inked = (0..mask.height())
            .flat_map(|y| (0..mask.width()).map(move |x| (x, y)))
            .any(|(x, y)| {
                #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
                let (px, py) = (min.x as f32 + x as f32 + 0.5, min.y as f32 + y as f32 + 0.5);
                mask.sample(px, py) > 0.99
            });
        assert!(inked, "expected solid coverage in the stems of 'H'");
    }

    #[test]
    fn oversized_run_is_rejected_before_allocating() {
        let face = face();
        let err = face.rasterize("WWWWWWWWWW", 25_000).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "fontSizePx", .. }));

        let err = face.rasterize("CONFIDENTIAL", u32::MAX).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));

        // a large but bounded run still rasterizes
        let mask = face.rasterize("W", 2_000).unwrap().unwrap();
        assert!(u64::from(mask.width()) * u64::from(mask.height()) <= MAX_MASK_PIXELS);
    }
}
