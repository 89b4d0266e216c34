//! Source decoding.
//!
//! Raster formats the `image` crate understands are decoded directly, with the
//! format sniffed from magic bytes. HEIC/HEIF is first transcoded to JPEG by a
//! [`HeicConverter`], since there is no pure-Rust HEVC decoder.

use std::io::{Cursor, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder as _, ImageReader};

use crate::error::{Error, Result};
use crate::raster::RasterImage;

/// JPEG quality used when transcoding HEIC/HEIF sources.
pub const HEIC_JPEG_QUALITY: f32 = 0.95;

const HEIF_MIME_TYPES: &[&str] = &[
    "image/heic",
    "image/heif",
    "image/heic-sequence",
    "image/heif-sequence",
];

const HEIF_BRANDS: &[&[u8; 4]] = &[
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"mif1", b"msf1",
];

/// What the caller knows about the bytes besides their content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceHint {
    /// Original file name, used for its extension.
    pub file_name: Option<String>,
    /// Declared MIME type.
    pub mime: Option<String>,
}

impl SourceHint {
    /// Hint from a file path.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        Self {
            file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
            mime: None,
        }
    }

    /// Attach a declared MIME type.
    #[must_use]
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    fn extension(&self) -> Option<String> {
        let name = self.file_name.as_deref()?;
        Path::new(name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }

    fn mime(&self) -> Option<String> {
        self.mime.as_deref().map(|m| m.trim().to_ascii_lowercase())
    }
}

/// Whether the source is HEIC/HEIF, by declared type, extension or `ftyp` brand.
#[must_use]
pub fn is_heif(bytes: &[u8], hint: &SourceHint) -> bool {
    if hint
        .mime()
        .is_some_and(|m| HEIF_MIME_TYPES.contains(&m.as_str()))
    {
        return true;
    }
    if hint
        .extension()
        .is_some_and(|e| e == "heic" || e == "heif")
    {
        return true;
    }
    bytes.len() >= 12
        && &bytes[4..8] == b"ftyp"
        && HEIF_BRANDS.iter().any(|brand| &bytes[8..12] == brand.as_slice())
}

/// Transcodes HEIC/HEIF bytes into JPEG.
pub trait HeicConverter: Send + Sync {
    /// Convert `heic` to JPEG bytes at `quality` in `(0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FormatConversion`] if the conversion fails.
    fn to_jpeg(&self, heic: &[u8], quality: f32) -> Result<Vec<u8>>;
}

/// Converts by piping bytes through an external program's stdin and stdout.
///
/// The literal argument `{quality}` is replaced by the 1-100 JPEG quality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalConverter {
    program: PathBuf,
    args: Vec<String>,
}

impl Default for ExternalConverter {
    fn default() -> Self {
        Self::imagemagick()
    }
}

impl ExternalConverter {
    /// Use an arbitrary program.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// ImageMagick 7: `magick heic:- -quality {quality} jpeg:-`.
    #[must_use]
    pub fn imagemagick() -> Self {
        Self::new(
            "magick",
            ["heic:-", "-quality", "{quality}", "jpeg:-"]
                .map(String::from)
                .to_vec(),
        )
    }
}

impl HeicConverter for ExternalConverter {
    fn to_jpeg(&self, heic: &[u8], quality: f32) -> Result<Vec<u8>> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let percent = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
        let args = self
            .args
            .iter()
            .map(|a| a.replace("{quality}", &percent.to_string()));
        let program = self.program.display().to_string();

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::FormatConversion(format!(
                    "failed to start `{program}` (is it installed and on PATH?): {e}"
                ))
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            Error::FormatConversion(format!("failed to open `{program}` stdin"))
        })?;
        // stdout can fill before stdin drains, so write from a separate thread
        let input = heic.to_vec();
        let writer = std::thread::spawn(move || stdin.write_all(&input));

        let output = child.wait_with_output().map_err(|e| {
            Error::FormatConversion(format!("failed to wait for `{program}`: {e}"))
        })?;
        let written = writer
            .join()
            .map_err(|_| Error::FormatConversion(format!("`{program}` stdin writer panicked")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::FormatConversion(format!(
                "`{program}` exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        written.map_err(|e| {
            Error::FormatConversion(format!("failed to write to `{program}`: {e}"))
        })?;
        if output.stdout.is_empty() {
            return Err(Error::FormatConversion(format!(
                "`{program}` produced no output"
            )));
        }

        Ok(output.stdout)
    }
}

/// Turns uploaded bytes into a [`RasterImage`].
pub struct FormatDecoder {
    converter: Box<dyn HeicConverter>,
}

impl std::fmt::Debug for FormatDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatDecoder").finish_non_exhaustive()
    }
}

impl Default for FormatDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatDecoder {
    /// Decoder that transcodes HEIC/HEIF with ImageMagick.
    #[must_use]
    pub fn new() -> Self {
        Self::with_converter(ExternalConverter::imagemagick())
    }

    /// Decoder with a custom HEIC/HEIF converter.
    #[must_use]
    pub fn with_converter(converter: impl HeicConverter + 'static) -> Self {
        Self {
            converter: Box::new(converter),
        }
    }

    /// Decode `bytes` into a raster.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FormatConversion`] if HEIC/HEIF transcoding fails and
    /// [`Error::Decode`] for audio/video input or undecodable bytes.
    #[tracing::instrument(skip_all, fields(name = ?hint.file_name, len = bytes.len()))]
    pub fn decode(&self, bytes: &[u8], hint: &SourceHint) -> Result<RasterImage> {
        if let Some(mime) = hint.mime() {
            if mime.starts_with("video/") || mime.starts_with("audio/") {
                return Err(Error::Decode(format!("{mime} is not a still image")));
            }
        }
        if bytes.is_empty() {
            return Err(Error::Decode("input is empty".to_string()));
        }

        if is_heif(bytes, hint) {
            tracing::debug!("transcoding HEIC/HEIF source to JPEG");
            let jpeg = self.converter.to_jpeg(bytes, HEIC_JPEG_QUALITY)?;
            return decode_raster(&jpeg);
        }

        decode_raster(bytes)
    }
}

/// Decode with the format sniffed from magic bytes, honoring EXIF orientation.
fn decode_raster(bytes: &[u8]) -> Result<RasterImage> {
    let decode_err = |e: image::ImageError| Error::Decode(e.to_string());

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| Error::Decode(e.to_string()))?;
    if reader.format().is_none() {
        return Err(Error::Decode("unrecognized image format".to_string()));
    }

    let mut decoder = reader.into_decoder().map_err(decode_err)?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut image = DynamicImage::from_decoder(decoder).map_err(decode_err)?;
    image.apply_orientation(orientation);

    tracing::debug!(width = image.width(), height = image.height(), "decoded");
    Ok(image.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use image::{Rgba, RgbaImage};

    use crate::encoder::encode;
    use crate::params::{EncodingOptions, OutputFormat};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        encode(&img, &EncodingOptions::preview()).unwrap().bytes
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 255]));
        encode(&img, &EncodingOptions::new(OutputFormat::Jpeg, 0.9))
            .unwrap()
            .bytes
    }

    fn heic_header() -> Vec<u8> {
        let mut bytes = vec![0, 0, 0, 24];
        bytes.extend_from_slice(b"ftypheic");
        bytes.extend_from_slice(&[0; 12]);
        bytes
    }

    struct FakeConverter {
        jpeg: Vec<u8>,
        seen_quality: Arc<Mutex<Option<f32>>>,
    }

    impl HeicConverter for FakeConverter {
        fn to_jpeg(&self, _heic: &[u8], quality: f32) -> Result<Vec<u8>> {
            *self.seen_quality.lock().unwrap() = Some(quality);
            Ok(self.jpeg.clone())
        }
    }

    struct FailingConverter;

    impl HeicConverter for FailingConverter {
        fn to_jpeg(&self, _heic: &[u8], _quality: f32) -> Result<Vec<u8>> {
            Err(Error::FormatConversion("unsupported HEVC profile".to_string()))
        }
    }

    #[test]
    fn heif_detected_by_mime_extension_or_brand() {
        let none = SourceHint::default();
        assert!(is_heif(&[], &none.clone().with_mime("image/HEIC")));
        assert!(is_heif(&[], &SourceHint::from_path(Path::new("/tmp/IMG_0001.HEIF"))));
        assert!(is_heif(&heic_header(), &none));

        assert!(!is_heif(&png_bytes(1, 1), &none));
        assert!(!is_heif(&[], &SourceHint::from_path(Path::new("photo.png"))));
    }

    #[test]
    fn raster_formats_pass_through() {
        let decoder = FormatDecoder::with_converter(FailingConverter);
        let image = decoder
            .decode(&png_bytes(7, 5), &SourceHint::from_path(Path::new("a.png")))
            .unwrap();
        assert_eq!((image.width(), image.height()), (7, 5));
        assert_eq!(image.pixels().get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn magic_bytes_win_over_wrong_extension() {
        let decoder = FormatDecoder::with_converter(FailingConverter);
        let image = decoder
            .decode(&jpeg_bytes(9, 4), &SourceHint::from_path(Path::new("really.png")))
            .unwrap();
        assert_eq!((image.width(), image.height()), (9, 4));
    }

    #[test]
    fn heic_is_converted_at_095() {
        let seen_quality = Arc::new(Mutex::new(None));
        let converter = FakeConverter {
            jpeg: jpeg_bytes(12, 8),
            seen_quality: Arc::clone(&seen_quality),
        };
        let decoder = FormatDecoder::with_converter(converter);
        let image = decoder.decode(&heic_header(), &SourceHint::default()).unwrap();

        assert_eq!((image.width(), image.height()), (12, 8));
        let quality = seen_quality.lock().unwrap().unwrap();
        assert!((quality - 0.95).abs() < f32::EPSILON);
    }

    #[test]
    fn conversion_failure_is_reported() {
        let decoder = FormatDecoder::with_converter(FailingConverter);
        let err = decoder
            .decode(&heic_header(), &SourceHint::default())
            .unwrap_err();
        assert!(matches!(err, Error::FormatConversion(_)));
    }

    #[test]
    fn corrupt_and_empty_bytes_fail_to_decode() {
        let decoder = FormatDecoder::with_converter(FailingConverter);
        let mut truncated = png_bytes(16, 16);
        truncated.truncate(40);

        for bytes in [Vec::new(), b"not an image".to_vec(), truncated] {
            let err = decoder.decode(&bytes, &SourceHint::default()).unwrap_err();
            assert!(matches!(err, Error::Decode(_)), "{err}");
        }
    }

    #[test]
    fn video_is_rejected() {
        let decoder = FormatDecoder::with_converter(FailingConverter);
        let err = decoder
            .decode(&png_bytes(1, 1), &SourceHint::default().with_mime("video/quicktime"))
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn missing_external_program_is_a_conversion_error() {
        let converter = ExternalConverter::new("definitely-not-a-real-converter-binary", vec![]);
        let err = converter.to_jpeg(&heic_header(), 0.95).unwrap_err();
        assert!(matches!(err, Error::FormatConversion(_)));
        assert!(err.to_string().contains("definitely-not-a-real-converter-binary"));
    }

    #[cfg(unix)]
    #[test]
    fn external_program_output_is_decoded() {
        // `cat` echoes the JPEG we feed it, standing in for a real converter
        let decoder = FormatDecoder::with_converter(ExternalConverter::new("cat", vec![]));
        let jpeg = jpeg_bytes(6, 3);
        let image = decoder
            .decode(&jpeg, &SourceHint::default().with_mime("image/heic"))
            .unwrap();
        assert_eq!((image.width(), image.height()), (6, 3));
    }

    #[cfg(unix)]
    #[test]
    fn external_program_failure_is_reported() {
        let converter = ExternalConverter::new("false", vec![]);
        let err = converter.to_jpeg(&heic_header(), 0.95).unwrap_err();
        assert!(matches!(err, Error::FormatConversion(_)));
    }

    #[test]
    fn imagemagick_substitutes_quality() {
        let converter = ExternalConverter::imagemagick();
        assert!(converter.args.iter().any(|a| a == "{quality}"));
        assert_eq!(converter.program, PathBuf::from("magick"));
    }
}
