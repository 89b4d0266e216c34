//! Tile a watermark across a single image.
//!
//! Usage:
//! ```sh
//! cargo run --example watermark_tiles -- input.jpg "FOR KYC ONLY" [output.png]
//! ```

use std::env;
use std::path::Path;
use std::process;

use text_watermark::{
    default_output_path, FormatDecoder, OutputFormat, ProcessOptions, WatermarkEngine,
    WatermarkParameters,
};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <input> <text> [output]", args[0]);
        process::exit(1);
    }

    let input = Path::new(&args[1]);
    let output = args
        .get(3)
        .map_or_else(|| default_output_path(input, OutputFormat::Png), Into::into);

    let engine = WatermarkEngine::new().expect("failed to initialize engine");
    let opts = ProcessOptions {
        params: WatermarkParameters {
            text: args[2].clone(),
            ..WatermarkParameters::default()
        },
        ..ProcessOptions::default()
    };
    let result = engine.process_file(&FormatDecoder::new(), input, &output, &opts);

    if result.success {
        println!("Done: {} -> {}", result.message, output.display());
    } else {
        eprintln!("Error: {}", result.message);
        process::exit(1);
    }
}
