//! Output encoding for PNG, JPEG and WebP.
//!
//! PNG is always lossless. JPEG has no alpha channel, so the surface is
//! flattened over black first, which is what a browser canvas does. WebP is
//! written with the pure-Rust lossless encoder; for quality below 1.0 the RGB
//! channels are quantized first so the output trades detail for size.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage, RgbaImage};

use crate::error::{Error, Result};
use crate::params::{EncodingOptions, OutputFormat};

/// Encoded output bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// The encoded file contents.
    pub bytes: Vec<u8>,
    /// Container of `bytes`.
    pub format: OutputFormat,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
}

impl EncodedImage {
    /// MIME type of the bytes.
    #[must_use]
    pub fn mime(&self) -> &'static str {
        self.format.mime()
    }
}

/// Encode a surface.
///
/// # Errors
///
/// Returns [`Error::Encoding`] if a lossy format gets a quality outside
/// `(0, 1]`, or if the underlying encoder fails.
pub fn encode(surface: &RgbaImage, options: &EncodingOptions) -> Result<EncodedImage> {
    let (width, height) = surface.dimensions();
    let mut bytes = Vec::new();

    match options.format {
        OutputFormat::Png => {
            PngEncoder::new(Cursor::new(&mut bytes))
                .write_image(surface.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(|e| Error::Encoding(format!("PNG: {e}")))?;
        }
        OutputFormat::Jpeg => {
            let quality = percent_quality(options)?;
            let rgb = flatten_over_black(surface);
            JpegEncoder::new_with_quality(Cursor::new(&mut bytes), quality)
                .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                .map_err(|e| Error::Encoding(format!("JPEG at quality {quality}: {e}")))?;
        }
        OutputFormat::WebP => {
            let quality = percent_quality(options)?;
            let mut rgba = surface.clone();
            quantize_rgb(&mut rgba, quality);
            WebPEncoder::new_lossless(Cursor::new(&mut bytes))
                .write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(|e| Error::Encoding(format!("WebP at quality {quality}: {e}")))?;
        }
    }

    Ok(EncodedImage {
        bytes,
        format: options.format,
        width,
        height,
    })
}

/// Map quality `(0, 1]` onto the 1-100 scale.
fn percent_quality(options: &EncodingOptions) -> Result<u8> {
    let q = options.quality;
    if !(q > 0.0 && q <= 1.0) {
        return Err(Error::Encoding(format!(
            "{:?} quality must be within (0, 1], got {q}",
            options.format
        )));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let percent = (q * 100.0).round().clamp(1.0, 100.0) as u8;
    Ok(percent)
}

fn flatten_over_black(surface: &RgbaImage) -> RgbImage {
    let mut rgb = RgbImage::new(surface.width(), surface.height());
    for (dst, src) in rgb.pixels_mut().zip(surface.pixels()) {
        let a = u16::from(src[3]);
        for ch in 0..3 {
            dst[ch] = mul_div255(u16::from(src[ch]), a);
        }
    }
    rgb
}

#[allow(clippy::cast_possible_truncation)]
fn mul_div255(a: u16, b: u16) -> u8 {
    ((u32::from(a) * u32::from(b) + 127) / 255) as u8
}

/// Quantize RGB channels for a quality below 100; alpha is left untouched.
fn quantize_rgb(data: &mut [u8], quality: u8) {
    if quality >= 100 {
        return;
    }
    let levels = levels_for_quality(quality);
    let step = 255.0 / (f32::from(levels) - 1.0);
    for pixel in data.chunks_exact_mut(4) {
        for channel in pixel.iter_mut().take(3) {
            let bucket = (f32::from(*channel) / step).round();
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                *channel = (bucket * step).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Bias toward fine palettes at high quality, coarse ones at low quality.
fn levels_for_quality(quality: u8) -> u16 {
    let normalized = f32::from(quality.clamp(1, 100)) / 100.0;
    let levels = 2.0 + normalized * normalized * 254.0;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let levels = levels.round().clamp(2.0, 256.0) as u16;
    levels
}
