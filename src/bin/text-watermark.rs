use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use text_watermark::{
    default_output_path, EncodingOptions, FormatDecoder, Mode, OutputFormat, Position,
    ProcessOptions, ProcessResult, Rgb, WatermarkEngine, WatermarkParameters,
};

#[derive(Parser)]
#[command(
    name = "text-watermark",
    about = "Burn tiled or positioned text watermarks into images",
    version,
    after_help = "Simple usage: text-watermark <image> --text \"FOR KYC ONLY\"\n\n\
                  HEIC/HEIF sources are converted with ImageMagick (`magick`), which must be on PATH."
)]
struct Cli {
    /// Input image file or directory
    input: String,

    /// Output file or directory (default: watermarked_{name}.{ext})
    #[arg(short, long)]
    output: Option<String>,

    /// JSON preset with watermark parameters; flags override its values
    #[arg(short, long)]
    preset: Option<PathBuf>,

    /// Watermark text
    #[arg(short, long)]
    text: Option<String>,

    /// Font size in pixels
    #[arg(long)]
    font_size: Option<u32>,

    /// Text color as #RGB or #RRGGBB
    #[arg(long)]
    color: Option<Rgb>,

    /// Text opacity (0.0-1.0)
    #[arg(long)]
    opacity: Option<f32>,

    /// Draw once or tile across the image
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Anchor for single mode
    #[arg(long, value_enum)]
    position: Option<Position>,

    /// Rotation in degrees (-180 to 180)
    #[arg(short, long, allow_hyphen_values = true)]
    rotation: Option<f64>,

    /// Gap between tiles as a percentage of the rotated text width (0-300)
    #[arg(long)]
    spacing: Option<f64>,

    /// Horizontal shift as a percentage of the image width (-50 to 50)
    #[arg(long, allow_hyphen_values = true)]
    offset_x: Option<f64>,

    /// Vertical shift as a percentage of the image height (-50 to 50)
    #[arg(long, allow_hyphen_values = true)]
    offset_y: Option<f64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "png")]
    format: OutputFormat,

    /// Quality for JPEG and WebP (0.0 exclusive to 1.0)
    #[arg(long, default_value = "0.92")]
    quality: f32,

    /// TTF/OTF font file to use instead of the embedded face
    #[arg(long)]
    font: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn parameters(&self) -> text_watermark::Result<WatermarkParameters> {
        let mut params = match &self.preset {
            Some(path) => WatermarkParameters::from_json(&std::fs::read_to_string(path)?)?,
            None => WatermarkParameters::default(),
        };

        if let Some(text) = &self.text {
            params.text.clone_from(text);
        }
        if let Some(v) = self.font_size {
            params.font_size_px = v;
        }
        if let Some(v) = self.color {
            params.color = v;
        }
        if let Some(v) = self.opacity {
            params.opacity = v;
        }
        if let Some(v) = self.mode {
            params.mode = v;
        }
        if let Some(v) = self.position {
            params.position = v;
        }
        if let Some(v) = self.rotation {
            params.rotation_deg = v;
        }
        if let Some(v) = self.spacing {
            params.spacing_percent = v;
        }
        if let Some(v) = self.offset_x {
            params.offset_x_percent = v;
        }
        if let Some(v) = self.offset_y {
            params.offset_y_percent = v;
        }

        params.validate()?;
        Ok(params)
    }

    fn engine(&self) -> text_watermark::Result<WatermarkEngine> {
        match &self.font {
            Some(path) => WatermarkEngine::with_font(std::fs::read(path)?),
            None => WatermarkEngine::new(),
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let params = match cli.parameters() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let opts = ProcessOptions {
        params,
        encoding: EncodingOptions::new(cli.format, cli.quality),
    };

    let engine = match cli.engine() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Fatal: Failed to initialize engine: {e}");
            process::exit(1);
        }
    };
    let decoder = FormatDecoder::new();

    let input_path = Path::new(&cli.input);
    if !input_path.exists() {
        eprintln!("Error: Input path does not exist: {}", cli.input);
        process::exit(1);
    }

    if !cli.quiet {
        eprintln!(
            "Watermark \"{}\" ({:?}, {}px, {}) -> {}",
            opts.params.text,
            opts.params.mode,
            opts.params.font_size_px,
            opts.params.color,
            opts.encoding.format.extension()
        );
        eprintln!();
    }

    let results = if input_path.is_dir() {
        let output_dir = if let Some(o) = &cli.output {
            PathBuf::from(o)
        } else {
            eprintln!("Error: Output directory is required for batch processing");
            eprintln!("Usage: text-watermark <input_dir> -o <output_dir>");
            process::exit(1);
        };
        engine.process_directory(&decoder, input_path, &output_dir, &opts)
    } else {
        let output_path = match &cli.output {
            Some(o) => PathBuf::from(o),
            None => default_output_path(input_path, opts.encoding.format),
        };
        vec![engine.process_file(&decoder, input_path, &output_path, &opts)]
    };

    let mut success_count = 0u32;
    let mut fail_count = 0u32;

    for r in &results {
        print_result(r, cli.verbose, cli.quiet);
        if r.success {
            success_count += 1;
        } else {
            fail_count += 1;
        }
    }

    if results.len() > 1 && !cli.quiet {
        eprintln!();
        eprint!("[Summary] Processed: {success_count}");
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

fn print_result(result: &ProcessResult, verbose: bool, quiet: bool) {
    if quiet && result.success {
        return;
    }

    let filename = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    if result.success {
        match &result.output {
            Some(out) => eprintln!("[OK] {filename} -> {}", out.display()),
            None => eprintln!("[OK] {filename}"),
        }
    } else {
        eprintln!("[FAIL] {filename}: {}", result.message);
    }

    if verbose && result.success && !result.message.is_empty() {
        eprintln!("  -> {}", result.message);
    }
}
