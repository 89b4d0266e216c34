//! Burn text watermarks into raster images.
//!
//! A watermark is a single glyph run drawn either once at an anchored
//! position or repeated across the whole image on a rotated grid. Sources are
//! decoded from PNG, JPEG, WebP, BMP and HEIC/HEIF (the latter through an
//! external converter); results are encoded as PNG, JPEG or WebP.
//!
//! # Quick Start
//!
//! ```no_run
//! use text_watermark::{
//!     EncodingOptions, FormatDecoder, OutputFormat, SourceHint, WatermarkEngine,
//!     WatermarkParameters,
//! };
//!
//! let engine = WatermarkEngine::new().expect("failed to load font");
//! let bytes = std::fs::read("passport.heic").unwrap();
//! let image = FormatDecoder::new()
//!     .decode(&bytes, &SourceHint::from_path("passport.heic".as_ref()))
//!     .unwrap();
//!
//! let params = WatermarkParameters {
//!     text: "FOR RENTAL APPLICATION ONLY".into(),
//!     ..WatermarkParameters::default()
//! };
//! let export = engine
//!     .export(&image, &params, &EncodingOptions::new(OutputFormat::Jpeg, 0.9), "passport.heic")
//!     .unwrap();
//! std::fs::write(&export.file_name, &export.image.bytes).unwrap();
//! ```
//!
//! # Previews
//!
//! [`PreviewScheduler`] re-renders a lossless preview in the background while
//! parameters change, waiting for a short quiet period first.
//!
//! ```no_run
//! use std::sync::Arc;
//! use text_watermark::{PreviewScheduler, RasterImage, WatermarkEngine, WatermarkParameters};
//!
//! let engine = Arc::new(WatermarkEngine::new().unwrap());
//! let image = Arc::new(RasterImage::from(image::open("photo.png").unwrap()));
//! let previews = PreviewScheduler::new(engine, image).unwrap();
//!
//! previews.update(WatermarkParameters::default());
//! if let Some(preview) = previews.latest() {
//!     println!("preview #{}: {} bytes", preview.generation, preview.image.bytes.len());
//! }
//! ```

#![deny(missing_docs)]

pub mod blending;
pub mod decoder;
pub mod encoder;
mod engine;
pub mod error;
pub mod glyphs;
pub mod layout;
pub mod params;
pub mod raster;
pub mod scheduler;

pub use decoder::{ExternalConverter, FormatDecoder, HeicConverter, SourceHint};
pub use encoder::EncodedImage;
pub use engine::{
    default_output_path, export_file_name, is_supported_image, Export, ProcessOptions,
    ProcessResult, WatermarkEngine,
};
pub use error::{Error, Result};
pub use params::{EncodingOptions, Mode, OutputFormat, Position, Rgb, WatermarkParameters};
pub use raster::RasterImage;
pub use scheduler::{Preview, PreviewScheduler};
