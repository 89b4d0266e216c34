//! Watermark and encoding parameters.
//!
//! [`WatermarkParameters`] is the value a caller owns and changes between
//! renders. It deserializes from JSON presets, so every field has a default.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Placement algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One glyph run anchored at a [`Position`].
    Single,
    /// A rotated grid of glyph runs covering the whole canvas.
    #[default]
    Tile,
}

/// Anchor for [`Mode::Single`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    /// Centered on the canvas, baseline-centered vertically.
    #[default]
    Center,
    /// Top-left corner, inset by the edge margin.
    TopLeft,
    /// Top-right corner, inset by the edge margin.
    TopRight,
    /// Bottom-left corner, inset by the edge margin.
    BottomLeft,
    /// Bottom-right corner, inset by the edge margin.
    BottomRight,
}

/// An opaque RGB color, written as `#RGB` or `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Create a color from its channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl FromStr for Rgb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s
            .trim()
            .strip_prefix('#')
            .ok_or_else(|| Error::invalid("color", format!("`{s}` must start with '#'")))?;

        let digit = |range: std::ops::Range<usize>| {
            hex.get(range)
                .and_then(|d| u8::from_str_radix(d, 16).ok())
                .ok_or_else(|| Error::invalid("color", format!("`{s}` has an invalid hex digit")))
        };

        match hex.len() {
            // #RGB: each nibble is doubled, 0xA -> 0xAA
            3 => Ok(Self::new(digit(0..1)? * 17, digit(1..2)? * 17, digit(2..3)? * 17)),
            6 => Ok(Self::new(digit(0..2)?, digit(2..4)?, digit(4..6)?)),
            n => Err(Error::invalid(
                "color",
                format!("`{s}` must be #RGB or #RRGGBB, got {n} hex digits"),
            )),
        }
    }
}

impl TryFrom<String> for Rgb {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Everything that controls how the watermark is drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatermarkParameters {
    /// Glyph run to stamp. May be empty.
    pub text: String,
    /// Font em size in pixels. Also used as the run height.
    pub font_size_px: u32,
    /// Fill color.
    pub color: Rgb,
    /// Fill opacity in `[0, 1]`.
    pub opacity: f32,
    /// Placement algorithm.
    pub mode: Mode,
    /// Anchor, used only in [`Mode::Single`].
    pub position: Position,
    /// Rotation of each run around its own center, in degrees `[-180, 180]`.
    pub rotation_deg: f64,
    /// Gap between tiles as a percentage of the rotated run width `[0, 300]`.
    pub spacing_percent: f64,
    /// Horizontal shift as a percentage of canvas width `[-50, 50]`.
    pub offset_x_percent: f64,
    /// Vertical shift as a percentage of canvas height `[-50, 50]`.
    pub offset_y_percent: f64,
}

impl Default for WatermarkParameters {
    fn default() -> Self {
        Self {
            text: "WATERMARK".to_string(),
            font_size_px: 40,
            color: Rgb::new(0x80, 0x80, 0x80),
            opacity: 0.5,
            mode: Mode::Tile,
            position: Position::Center,
            rotation_deg: -30.0,
            spacing_percent: 50.0,
            offset_x_percent: 0.0,
            offset_y_percent: 0.0,
        }
    }
}

impl WatermarkParameters {
    /// Parse a JSON preset. Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Preset`] for malformed JSON and
    /// [`Error::InvalidParameter`] for out-of-range values.
    pub fn from_json(json: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    /// Check every field against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.font_size_px == 0 {
            return Err(Error::invalid("fontSizePx", "must be at least 1"));
        }
        check_range("opacity", f64::from(self.opacity), 0.0, 1.0)?;
        check_range("rotationDeg", self.rotation_deg, -180.0, 180.0)?;
        check_range("spacingPercent", self.spacing_percent, 0.0, 300.0)?;
        check_range("offsetXPercent", self.offset_x_percent, -50.0, 50.0)?;
        check_range("offsetYPercent", self.offset_y_percent, -50.0, 50.0)?;
        Ok(())
    }
}

fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<()> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::invalid(
            name,
            format!("must be within {min}..={max}, got {value}"),
        ))
    }
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossless PNG.
    #[default]
    Png,
    /// Baseline JPEG.
    #[cfg_attr(feature = "cli", value(alias = "jpg"))]
    Jpeg,
    /// WebP.
    #[cfg_attr(feature = "cli", value(name = "webp"))]
    WebP,
}

impl OutputFormat {
    /// File extension used for downloads. JPEG maps to `jpg`.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// MIME type of the encoded bytes.
    #[must_use]
    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }
}

/// Encoder selection for one render.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingOptions {
    /// Output container.
    pub format: OutputFormat,
    /// Quality in `(0, 1]`. Ignored for PNG.
    pub quality: f32,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self::preview()
    }
}

impl EncodingOptions {
    /// Lossless PNG, used for every preview render.
    #[must_use]
    pub const fn preview() -> Self {
        Self {
            format: OutputFormat::Png,
            quality: 1.0,
        }
    }

    /// Options for the given format and quality.
    #[must_use]
    pub const fn new(format: OutputFormat, quality: f32) -> Self {
        Self { format, quality }
    }
}
