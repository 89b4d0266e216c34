//! Core watermark rendering engine.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use image::RgbaImage;

use crate::blending;
use crate::decoder::{FormatDecoder, SourceHint};
use crate::encoder::{self, EncodedImage};
use crate::error::Result;
use crate::glyphs::Typeface;
use crate::layout::{self, CanvasSize, Placement, TextMetrics, TileGrid};
use crate::params::{EncodingOptions, Mode, OutputFormat, WatermarkParameters};
use crate::raster::RasterImage;

/// Options controlling file processing.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Watermark to burn in.
    pub params: WatermarkParameters,
    /// Output encoding.
    pub encoding: EncodingOptions,
}

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the processed file.
    pub path: PathBuf,
    /// Where the output was written, if it was.
    pub output: Option<PathBuf>,
    /// Whether processing succeeded.
    pub success: bool,
    /// Human-readable status message.
    pub message: String,
}

/// An export artifact ready to be saved or downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    /// Suggested file name, `watermarked_<stem>.<ext>`.
    pub file_name: String,
    /// Encoded bytes.
    pub image: EncodedImage,
}

/// The watermark engine holding the active typeface.
///
/// Create once with [`WatermarkEngine::new()`] and reuse for every render.
/// Rendering takes `&self` and allocates its own surface, so one engine can
/// serve many threads.
#[derive(Debug, Clone)]
pub struct WatermarkEngine {
    typeface: Typeface,
}

impl WatermarkEngine {
    /// Create an engine using the embedded default font.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FontLoad`](crate::Error::FontLoad) if the embedded font
    /// cannot be parsed.
    pub fn new() -> Result<Self> {
        Ok(Self {
            typeface: Typeface::embedded()?,
        })
    }

    /// Create an engine from TTF/OTF font bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FontLoad`](crate::Error::FontLoad) if the bytes are not
    /// a usable font.
    pub fn with_font(data: Vec<u8>) -> Result<Self> {
        Ok(Self {
            typeface: Typeface::from_bytes(data)?,
        })
    }

    /// Measure the glyph run for `params`.
    #[must_use]
    pub fn measure(&self, params: &WatermarkParameters) -> TextMetrics {
        self.typeface.measure(&params.text, params.font_size_px)
    }

    /// Draw the watermark onto a copy of `image`.
    ///
    /// The result always has the source's dimensions. Empty text returns an
    /// unmodified copy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`](crate::Error::InvalidParameter) for
    /// out-of-range parameters or a run too large to rasterize (see
    /// [`MAX_MASK_PIXELS`](crate::glyphs::MAX_MASK_PIXELS)), and
    /// [`Error::DegenerateTiling`](crate::Error::DegenerateTiling) when a tile
    /// grid would be too dense.
    #[tracing::instrument(
        skip_all,
        fields(width = image.width(), height = image.height(), mode = ?params.mode)
    )]
    pub fn compose(&self, image: &RasterImage, params: &WatermarkParameters) -> Result<RgbaImage> {
        params.validate()?;

        let mut surface = image.to_surface();
        if params.text.is_empty() {
            return Ok(surface);
        }

        let Some(mask) = self.typeface.rasterize(&params.text, params.font_size_px)? else {
            tracing::debug!("no visible glyphs, returning source unchanged");
            return Ok(surface);
        };

        let canvas = CanvasSize::new(surface.width(), surface.height());
        let metrics = self.measure(params);
        let placements: Vec<Placement> = match params.mode {
            Mode::Single => vec![layout::single_placement(params, canvas, metrics)],
            Mode::Tile => TileGrid::new(params, canvas, metrics)?.placements().collect(),
        };

        for placement in &placements {
            blending::draw_run(&mut surface, &mask, placement, params.color, params.opacity);
        }
        tracing::debug!(runs = placements.len(), "watermark drawn");

        Ok(surface)
    }

    /// Draw the watermark and encode the result.
    ///
    /// Deterministic: identical arguments give byte-identical output.
    ///
    /// # Errors
    ///
    /// Everything [`compose`](Self::compose) returns, plus
    /// [`Error::Encoding`](crate::Error::Encoding) from the encoder.
    pub fn render(
        &self,
        image: &RasterImage,
        params: &WatermarkParameters,
        encoding: &EncodingOptions,
    ) -> Result<EncodedImage> {
        let surface = self.compose(image, params)?;
        encoder::encode(&surface, encoding)
    }

    /// Lossless PNG render for previews, whatever the export format.
    ///
    /// # Errors
    ///
    /// See [`render`](Self::render).
    pub fn preview(
        &self,
        image: &RasterImage,
        params: &WatermarkParameters,
    ) -> Result<EncodedImage> {
        self.render(image, params, &EncodingOptions::preview())
    }

    /// Render with the caller's encoding and name the artifact after
    /// `original_name`.
    ///
    /// # Errors
    ///
    /// See [`render`](Self::render).
    pub fn export(
        &self,
        image: &RasterImage,
        params: &WatermarkParameters,
        encoding: &EncodingOptions,
        original_name: &str,
    ) -> Result<Export> {
        let image = self.render(image, params, encoding)?;
        Ok(Export {
            file_name: export_file_name(original_name, encoding.format),
            image,
        })
    }

    fn process_file_inner(
        &self,
        decoder: &FormatDecoder,
        input: &Path,
        output: &Path,
        opts: &ProcessOptions,
    ) -> Result<EncodedImage> {
        let bytes = std::fs::read(input)?;
        let image = decoder.decode(&bytes, &SourceHint::from_path(input))?;
        let encoded = self.render(&image, &opts.params, &opts.encoding)?;

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(output, &encoded.bytes)?;
        Ok(encoded)
    }

    /// Process a single image file: load, decode, watermark, encode, save.
    ///
    /// Returns a [`ProcessResult`] indicating success or failure.
    #[must_use]
    pub fn process_file(
        &self,
        decoder: &FormatDecoder,
        input: &Path,
        output: &Path,
        opts: &ProcessOptions,
    ) -> ProcessResult {
        let mut result = ProcessResult {
            path: input.to_path_buf(),
            output: None,
            success: false,
            message: String::new(),
        };

        match self.process_file_inner(decoder, input, output, opts) {
            Ok(encoded) => {
                tracing::info!(input = %input.display(), output = %output.display(), "watermarked");
                result.success = true;
                result.output = Some(output.to_path_buf());
                result.message = format!(
                    "Wrote {}x{} {} ({} bytes)",
                    encoded.width,
                    encoded.height,
                    encoded.format.extension(),
                    encoded.bytes.len()
                );
            }
            Err(e) => {
                tracing::warn!(input = %input.display(), error = %e, "failed");
                result.message = e.to_string();
            }
        }

        result
    }

    /// Process all supported images in a directory.
    ///
    /// Outputs are named with [`export_file_name`]; sources sharing a stem keep
    /// their extension in the output name so no result overwrites another.
    /// Uses parallel iteration when the `cli` feature is enabled (via rayon).
    #[must_use]
    pub fn process_directory(
        &self,
        decoder: &FormatDecoder,
        input_dir: &Path,
        output_dir: &Path,
        opts: &ProcessOptions,
    ) -> Vec<ProcessResult> {
        let entries: Vec<PathBuf> = match std::fs::read_dir(input_dir) {
            Ok(rd) => rd
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
                .map(|e| e.path())
                .filter(|p| is_supported_image(p))
                .collect(),
            Err(e) => {
                return vec![ProcessResult {
                    path: input_dir.to_path_buf(),
                    output: None,
                    success: false,
                    message: format!("Failed to read directory: {e}"),
                }];
            }
        };

        let outputs = batch_outputs(&entries, output_dir, opts.encoding.format);
        let run = |(input, output): (&PathBuf, &std::result::Result<PathBuf, String>)| {
            match output {
                Ok(output) => self.process_file(decoder, input, output, opts),
                Err(message) => {
                    tracing::warn!(input = %input.display(), "{message}");
                    ProcessResult {
                        path: input.clone(),
                        output: None,
                        success: false,
                        message: message.clone(),
                    }
                }
            }
        };

        #[cfg(feature = "cli")]
        {
            use rayon::prelude::*;
            entries.par_iter().zip(outputs.par_iter()).map(run).collect()
        }

        #[cfg(not(feature = "cli"))]
        {
            entries.iter().zip(outputs.iter()).map(run).collect()
        }
    }
}

/// Output path for each batch input, in input order.
///
/// Inputs whose [`export_file_name`] would clash (`id.png` and `id.jpg`, compared
/// case-insensitively) keep their source extension in the stem instead:
/// `watermarked_id_png.png`, `watermarked_id_jpg.png`. A name that is still
/// taken is an error for that input.
fn batch_outputs(
    entries: &[PathBuf],
    output_dir: &Path,
    format: OutputFormat,
) -> Vec<std::result::Result<PathBuf, String>> {
    let plain: Vec<String> = entries
        .iter()
        .map(|p| export_file_name(&p.file_name().unwrap_or_default().to_string_lossy(), format))
        .collect();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for name in &plain {
        *counts.entry(name.to_lowercase()).or_default() += 1;
    }
    let mut taken: HashSet<String> = counts
        .iter()
        .filter(|&(_, &n)| n == 1)
        .map(|(name, _)| name.clone())
        .collect();

    entries
        .iter()
        .zip(plain)
        .map(|(input, name)| {
            if counts.get(&name.to_lowercase()).copied() == Some(1) {
                return Ok(output_dir.join(name));
            }
            let stem = input.file_stem().unwrap_or_default().to_string_lossy();
            let ext = input.extension().unwrap_or_default().to_string_lossy();
            // the trailing extension is stripped again by export_file_name
            let renamed = export_file_name(&format!("{stem}_{ext}.{ext}"), format);
            if taken.insert(renamed.to_lowercase()) {
                Ok(output_dir.join(renamed))
            } else {
                Err(format!(
                    "output name {renamed} is already used by another file in this batch"
                ))
            }
        })
        .collect()
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp" | "heic" | "heif"
        ),
        None => false,
    }
}

/// Download name for an export: `watermarked_<stem>.<ext>`.
///
/// Example: `"IMG_0001.HEIC"` exported as JPEG becomes `"watermarked_IMG_0001.jpg"`.
#[must_use]
pub fn export_file_name(original: &str, format: OutputFormat) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("image");
    let stem: String = stem
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("watermarked_{stem}.{}", format.extension())
}

/// Default output path next to the input.
///
/// Example: `"/photos/cat.png"` exported as WebP becomes `"/photos/watermarked_cat.webp"`.
#[must_use]
pub fn default_output_path(input: &Path, format: OutputFormat) -> PathBuf {
    let name = input.file_name().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(export_file_name(&name, format))
}
