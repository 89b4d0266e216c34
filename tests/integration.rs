use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use text_watermark::{
    EncodingOptions, Error, FormatDecoder, HeicConverter, Mode, OutputFormat, Position,
    ProcessOptions, RasterImage, SourceHint, WatermarkEngine, WatermarkParameters,
};

fn photo(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        #[allow(clippy::cast_possible_truncation)]
        let shade = ((x + y) % 200) as u8 + 30;
        Rgba([shade, 255 - shade, 128, 255])
    })
}

fn encoded(img: &RgbaImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    let img = if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img.clone()).to_rgb8())
    } else {
        DynamicImage::ImageRgba8(img.clone())
    };
    img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

fn write_png(path: &Path, width: u32, height: u32) {
    std::fs::write(path, encoded(&photo(width, height), ImageFormat::Png)).unwrap();
}

struct JpegStandIn(Vec<u8>);

impl HeicConverter for JpegStandIn {
    fn to_jpeg(&self, _heic: &[u8], _quality: f32) -> text_watermark::Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

fn heic_header() -> Vec<u8> {
    let mut bytes = vec![0, 0, 0, 24];
    bytes.extend_from_slice(b"ftypheic");
    bytes.extend_from_slice(&[0; 12]);
    bytes
}

#[test]
fn engine_initializes_successfully() {
    assert!(WatermarkEngine::new().is_ok());
}

#[test]
fn png_upload_previews_and_exports_as_jpeg() {
    let engine = WatermarkEngine::new().unwrap();
    let bytes = encoded(&photo(640, 480), ImageFormat::Png);
    let hint = SourceHint::from_path(Path::new("lease.png"));
    let source = FormatDecoder::new().decode(&bytes, &hint).unwrap();

    let params = WatermarkParameters {
        text: "CONFIDENTIAL".to_string(),
        ..WatermarkParameters::default()
    };

    let preview = engine.preview(&source, &params).unwrap();
    assert_eq!(preview.mime(), "image/png");
    let shown = image::load_from_memory(&preview.bytes).unwrap();
    assert_eq!((shown.width(), shown.height()), (640, 480));
    assert_ne!(shown.to_rgba8(), *source.pixels());

    let export = engine
        .export(
            &source,
            &params,
            &EncodingOptions::new(OutputFormat::Jpeg, 0.85),
            "lease.png",
        )
        .unwrap();
    assert_eq!(export.file_name, "watermarked_lease.jpg");
    assert_eq!(export.image.mime(), "image/jpeg");
    let saved = image::load_from_memory(&export.image.bytes).unwrap();
    assert_eq!((saved.width(), saved.height()), (640, 480));
}

#[test]
fn same_inputs_give_identical_previews() {
    let engine = WatermarkEngine::new().unwrap();
    let raster: RasterImage = photo(300, 200).into();
    let params = WatermarkParameters {
        mode: Mode::Single,
        position: Position::BottomRight,
        rotation_deg: 15.0,
        ..WatermarkParameters::default()
    };

    let a = engine.preview(&raster, &params).unwrap();
    let b = engine.preview(&raster, &params).unwrap();
    assert_eq!(a.bytes, b.bytes);
}

#[test]
fn empty_text_export_matches_source() {
    let engine = WatermarkEngine::new().unwrap();
    let source = photo(120, 90);
    let raster: RasterImage = source.clone().into();
    let params = WatermarkParameters {
        text: String::new(),
        ..WatermarkParameters::default()
    };

    let preview = engine.preview(&raster, &params).unwrap();
    let shown = image::load_from_memory(&preview.bytes).unwrap().to_rgba8();
    assert_eq!(shown, source);
}

#[test]
fn heic_upload_goes_through_converter() {
    let jpeg = encoded(&photo(80, 60), ImageFormat::Jpeg);
    let decoder = FormatDecoder::with_converter(JpegStandIn(jpeg));

    let hint = SourceHint::from_path(Path::new("IMG_0042.HEIC"));
    let source = decoder.decode(&heic_header(), &hint).unwrap();
    assert_eq!((source.width(), source.height()), (80, 60));

    let export = WatermarkEngine::new()
        .unwrap()
        .export(
            &source,
            &WatermarkParameters::default(),
            &EncodingOptions::new(OutputFormat::WebP, 0.9),
            "IMG_0042.HEIC",
        )
        .unwrap();
    assert_eq!(export.file_name, "watermarked_IMG_0042.webp");
}

#[test]
fn video_upload_is_rejected() {
    let hint = SourceHint::default().with_mime("video/mp4");
    let err = FormatDecoder::new().decode(&[0; 64], &hint).unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
}

#[test]
fn preset_json_round_trips_through_engine() {
    let params = WatermarkParameters::from_json(
        r##"{"text":"KYC","fontSizePx":24,"color":"#c00","mode":"single","position":"top-left"}"##,
    )
    .unwrap();
    assert_eq!(params.mode, Mode::Single);

    let engine = WatermarkEngine::new().unwrap();
    let raster: RasterImage = photo(200, 100).into();
    let out = engine.preview(&raster, &params).unwrap();
    assert_eq!((out.width, out.height), (200, 100));
}

#[test]
fn process_file_writes_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.png");
    write_png(&input, 150, 100);
    let output = dir.path().join("out").join("scan.jpg");

    let engine = WatermarkEngine::new().unwrap();
    let opts = ProcessOptions {
        encoding: EncodingOptions::new(OutputFormat::Jpeg, 0.9),
        ..ProcessOptions::default()
    };
    let result = engine.process_file(&FormatDecoder::new(), &input, &output, &opts);

    assert!(result.success, "{}", result.message);
    assert_eq!(result.output.as_deref(), Some(output.as_path()));
    let written = image::open(&output).unwrap();
    assert_eq!((written.width(), written.height()), (150, 100));
}

#[test]
fn process_file_reports_corrupt_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.png");
    std::fs::write(&input, b"not an image").unwrap();
    let output = dir.path().join("broken_out.png");

    let engine = WatermarkEngine::new().unwrap();
    let result = engine.process_file(
        &FormatDecoder::new(),
        &input,
        &output,
        &ProcessOptions::default(),
    );

    assert!(!result.success);
    assert!(result.output.is_none());
    assert!(!output.exists());
}

#[test]
fn process_directory_handles_supported_files_only() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_png(&input.path().join("a.png"), 40, 30);
    write_png(&input.path().join("b.png"), 50, 20);
    std::fs::write(input.path().join("notes.txt"), "skip me").unwrap();

    let engine = WatermarkEngine::new().unwrap();
    let opts = ProcessOptions {
        encoding: EncodingOptions::new(OutputFormat::WebP, 1.0),
        ..ProcessOptions::default()
    };
    let results =
        engine.process_directory(&FormatDecoder::new(), input.path(), output.path(), &opts);

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success));
    assert!(output.path().join("watermarked_a.webp").exists());
    assert!(output.path().join("watermarked_b.webp").exists());
}

#[test]
fn process_directory_keeps_outputs_for_shared_stems() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_png(&input.path().join("id.png"), 40, 30);
    std::fs::write(
        input.path().join("id.jpg"),
        encoded(&photo(60, 20), ImageFormat::Jpeg),
    )
    .unwrap();

    let engine = WatermarkEngine::new().unwrap();
    let results = engine.process_directory(
        &FormatDecoder::new(),
        input.path(),
        output.path(),
        &ProcessOptions::default(),
    );

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success), "{results:?}");
    assert_ne!(results[0].output, results[1].output);

    let from_png = image::open(output.path().join("watermarked_id_png.png")).unwrap();
    let from_jpg = image::open(output.path().join("watermarked_id_jpg.png")).unwrap();
    assert_eq!((from_png.width(), from_png.height()), (40, 30));
    assert_eq!((from_jpg.width(), from_jpg.height()), (60, 20));
    assert!(!output.path().join("watermarked_id.png").exists());
}
