//! Error types for the text-watermark crate.

/// Errors that can occur while decoding, compositing or encoding an image.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source bytes are corrupt, not a still image, or use an unsupported codec.
    #[error("could not decode image: {0}")]
    Decode(String),

    /// Transcoding a HEIC/HEIF source to a decodable format failed.
    #[error("could not convert HEIC/HEIF image: {0}")]
    FormatConversion(String),

    /// The output encoder rejected the requested format/quality combination.
    #[error("could not encode image: {0}")]
    Encoding(String),

    /// The tile grid would need more placements than the renderer allows.
    #[error(
        "tile grid of {cols}x{rows} exceeds {max} placements; \
         increase spacing or font size, or change the rotation"
    )]
    DegenerateTiling {
        /// Number of grid columns, including padding.
        cols: u64,
        /// Number of grid rows, including padding.
        rows: u64,
        /// Maximum number of placements allowed per render.
        max: u64,
    },

    /// A watermark parameter is outside its accepted range.
    #[error("invalid watermark parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The font data could not be parsed.
    #[error("failed to load font: {0}")]
    FontLoad(String),

    /// A JSON parameter preset could not be parsed.
    #[error("invalid preset: {0}")]
    Preset(#[from] serde_json::Error),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
