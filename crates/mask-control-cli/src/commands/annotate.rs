//! Annotate command - classify every detected face and draw the verdicts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use mask_control_adapters::{collect_images, FsImageSource, ModelStore};
use mask_control_core::inference::{BlazeFaceProvider, OnnxClassifier};
use mask_control_core::{
    Pipeline, PipelineConfig, PipelineError, RenderTarget, ResultOutput, TensorLayout,
};
use tracing::{debug, info, warn};

use super::ExitCode;
use crate::config::AppConfig;
use crate::output::{JsonOutput, NoticePrinter, OutputFormat};

/// Parse and validate a threshold value (0.0-1.0).
fn parse_threshold(s: &str) -> Result<f32, String> {
    let value: f32 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not in 0.0..=1.0"))
    }
}

/// Parse a pixel dimension that must be at least 1.
fn parse_dimension(s: &str) -> Result<u32, String> {
    let value: u32 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid pixel size"))?;
    if value == 0 {
        Err("dimension must be greater than 0".to_string())
    } else {
        Ok(value)
    }
}

/// Shared arguments for face annotation.
#[derive(Args, Clone)]
pub struct AnnotateArgs {
    /// Images or directories to annotate
    pub paths: Vec<PathBuf>,

    /// Recurse into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Directory for annotated images (default: next to each input)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Draw onto the full-resolution image instead of the preview
    #[arg(long)]
    pub full_resolution: bool,

    /// Cap on the longer side of the preview, in pixels
    #[arg(long, value_name = "N", value_parser = parse_dimension)]
    pub preview_max: Option<u32>,

    /// Minimum face detection confidence (0.0-1.0)
    #[arg(long, value_parser = parse_threshold)]
    pub min_confidence: Option<f32>,

    /// Square input resolution of the classifier
    #[arg(long, value_name = "N", value_parser = parse_dimension)]
    pub input_size: Option<u32>,

    /// Classifier tensor layout (nhwc or nchw)
    #[arg(long)]
    pub layout: Option<TensorLayout>,

    /// TTF/OTF font for label text (built-in bitmap font otherwise)
    #[arg(long, value_name = "FILE")]
    pub font: Option<PathBuf>,

    /// Suppress per-face notices
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Pretty-print JSON output (only affects --format json)
    #[arg(long)]
    pub pretty: bool,

    /// Custom models directory (overrides default and config)
    #[arg(long, value_name = "DIR")]
    pub models_dir: Option<PathBuf>,

    /// Merged config (populated by `with_config`, not from CLI).
    #[arg(skip)]
    config: Option<AppConfig>,
}

impl AnnotateArgs {
    /// Apply configuration file values, respecting CLI precedence.
    ///
    /// Layering priority (lowest to highest):
    /// 1. Hardcoded defaults (`PipelineConfig::default`)
    /// 2. Config file values (XDG, then project-local)
    /// 3. CLI arguments (already set on self)
    pub fn with_config(mut args: Self, config: &AppConfig) -> Self {
        if !args.recursive {
            args.recursive = config.general.recursive.unwrap_or(false);
        }
        if !args.full_resolution {
            args.full_resolution = config.preview.full_resolution.unwrap_or(false);
        }

        args.preview_max = args
            .preview_max
            .or(config.preview.max_dimension.filter(|&d| d > 0));
        args.min_confidence = args.min_confidence.or(config
            .detector
            .min_confidence
            .filter(|t| (0.0..=1.0).contains(t)));
        args.input_size = args
            .input_size
            .or(config.classifier.input_size.filter(|&s| s > 0));
        args.layout = args.layout.or_else(|| config.layout());

        if args.font.is_none() {
            args.font.clone_from(&config.annotate.font_path);
        }
        if args.output_dir.is_none() {
            args.output_dir.clone_from(&config.output.dir);
        }

        if args.format.is_none() {
            args.format = config
                .output
                .format
                .as_ref()
                .and_then(|s| match s.as_str() {
                    "json" => Some(OutputFormat::Json),
                    "jsonl" => Some(OutputFormat::Jsonl),
                    _ => None,
                });
        }
        if !args.pretty {
            args.pretty = config.output.pretty.unwrap_or(false);
        }

        if args.models_dir.is_none() {
            args.models_dir.clone_from(&config.models.dir);
        }

        args.config = Some(config.clone());

        args
    }

    /// Get output format with fallback to JSONL.
    fn format(&self) -> OutputFormat {
        self.format.unwrap_or_default()
    }

    /// Builds the pipeline configuration from defaults, config file and flags.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut pipeline = self
            .config
            .as_ref()
            .map_or_else(PipelineConfig::default, AppConfig::pipeline_defaults);

        if let Some(max) = self.preview_max {
            pipeline = pipeline.with_preview_max_dimension(max);
        }
        if self.full_resolution {
            pipeline = pipeline.with_render_target(RenderTarget::Source);
        }
        if let Some(t) = self.min_confidence {
            pipeline.min_face_confidence = t;
        }
        let input_size = self.input_size.unwrap_or(pipeline.input_size);
        let layout = self.layout.unwrap_or(pipeline.layout);
        pipeline = pipeline.with_model_input(input_size, layout);
        if let Some(ref font) = self.font {
            pipeline = pipeline.with_font_path(font);
        }

        pipeline
    }
}

/// Result of running the annotate command.
#[allow(dead_code)] // Fields exposed for programmatic use
pub struct AnnotateResult {
    /// Number of images annotated.
    pub processed: usize,
    /// Number of images that could not be decoded.
    pub skipped: usize,
    /// Number of faces without a mask across all images.
    pub no_mask_faces: usize,
    /// Exit code.
    pub exit_code: ExitCode,
}

/// Run the annotate command.
///
/// Expects `args` to have been processed through `with_config()` first
/// to apply configuration file settings.
pub fn run(args: &AnnotateArgs) -> Result<AnnotateResult> {
    info!("Running annotate command on {} paths", args.paths.len());

    let files = collect_images(&args.paths, args.recursive);
    if files.is_empty() {
        anyhow::bail!("No images found in the given paths");
    }

    let config = args.pipeline_config();
    let store = ModelStore::resolve(args.models_dir.as_deref());
    debug!("Using models directory: {}", store.dir().display());

    let missing = store.missing(&config);
    if !missing.is_empty() {
        let names: Vec<_> = missing
            .iter()
            .map(|s| s.asset.filename.as_str())
            .collect();
        anyhow::bail!(
            "Missing model assets in {}: {}. Run `mask-control models list` for details",
            store.dir().display(),
            names.join(", ")
        );
    }

    if let Some(ref dir) = args.output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    }

    let pipeline = build_pipeline(config, store.dir())?;
    let output = JsonOutput::stdout(args.format(), args.pretty);

    process_images(&pipeline, &files, &output, args)
}

/// Wires the filesystem loader and the default backends into a pipeline.
fn build_pipeline(config: PipelineConfig, models_dir: &Path) -> Result<Pipeline> {
    let detectors = BlazeFaceProvider::new(
        config.detector_path(models_dir),
        config.min_face_confidence,
    );
    let classifier = OnnxClassifier::new(&config, models_dir);

    Pipeline::new(
        config,
        Arc::new(FsImageSource::new()),
        Arc::new(detectors),
        Arc::new(classifier),
    )
}

/// Annotates each image in turn and writes its report.
fn process_images(
    pipeline: &Pipeline,
    files: &[PathBuf],
    output: &JsonOutput,
    args: &AnnotateArgs,
) -> Result<AnnotateResult> {
    let mut processed = 0usize;
    let mut skipped = 0usize;
    let mut no_mask_faces = 0usize;

    for file in files {
        let reference = file.to_string_lossy();
        let notices = NoticePrinter::new(&*reference, args.quiet);

        let rendered = match pipeline.run(&reference, &notices) {
            Ok(rendered) => rendered,
            Err(e @ PipelineError::Decode(_)) => {
                warn!("Skipping {reference}: {e}");
                skipped += 1;
                continue;
            }
            Err(e) => {
                output.flush()?;
                return Err(e).with_context(|| format!("Failed to annotate {reference}"));
            }
        };

        let destination = annotated_path(file, args.output_dir.as_deref());
        rendered
            .image
            .save(&destination)
            .with_context(|| format!("Failed to write {}", destination.display()))?;
        info!("Wrote {}", destination.display());

        no_mask_faces += rendered.report.no_mask_count();
        output.write(&rendered.report)?;
        processed += 1;
    }

    output.flush()?;

    let exit_code = if skipped > 0 {
        ExitCode::Error
    } else if no_mask_faces > 0 {
        ExitCode::NoMask
    } else {
        ExitCode::Success
    };

    Ok(AnnotateResult {
        processed,
        skipped,
        no_mask_faces,
        exit_code,
    })
}

/// `<stem>.annotated.png`, next to the input or inside `output_dir`.
fn annotated_path(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "image".into(), |s| s.to_string_lossy());
    let name = format!("{stem}.annotated.png");

    match output_dir {
        Some(dir) => dir.join(name),
        None => input.with_file_name(name),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::{self, Write};
    use std::sync::Mutex;

    use clap::Parser;
    use image::{Rgb, RgbImage};
    use mask_control_core::FaceRegion;
    use mask_control_test_support::{StubClassifier, StubDetectorProvider};
    use tempfile::TempDir;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: AnnotateArgs,
    }

    fn parse(argv: &[&str]) -> AnnotateArgs {
        let mut full = vec!["mask-control"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).unwrap().args
    }

    #[test]
    fn test_parse_threshold() {
        assert_eq!(parse_threshold("0.5"), Ok(0.5));
        assert!(parse_threshold("1.5").unwrap_err().contains("0.0..=1.0"));
        assert!(parse_threshold("abc").is_err());
    }

    #[test]
    fn test_parse_dimension() {
        assert_eq!(parse_dimension("500"), Ok(500));
        assert!(parse_dimension("0").is_err());
        assert!(parse_dimension("-3").is_err());
    }

    #[test]
    fn test_annotated_path() {
        assert_eq!(
            annotated_path(Path::new("/photos/crowd.jpg"), None),
            PathBuf::from("/photos/crowd.annotated.png")
        );
        assert_eq!(
            annotated_path(Path::new("/photos/crowd.jpg"), Some(Path::new("/out"))),
            PathBuf::from("/out/crowd.annotated.png")
        );
    }

    #[test]
    fn test_defaults_without_config() {
        let args = AnnotateArgs::with_config(parse(&["a.jpg"]), &AppConfig::default());
        let config = args.pipeline_config();
        assert_eq!(config.preview_max_dimension, 500);
        assert_eq!(config.render_target, RenderTarget::Preview);
        assert_eq!(config.layout, TensorLayout::Nhwc);
        assert_eq!(args.format(), OutputFormat::Jsonl);
    }

    #[test]
    fn test_config_fills_unset_flags() {
        let file: AppConfig = toml::from_str(
            r"
[preview]
max_dimension = 320
full_resolution = true

[models]
model_file = 'masks.onnx'

[classifier]
input_size = 160
layout = 'nchw'

[output]
format = 'json'
",
        )
        .unwrap();

        let args = AnnotateArgs::with_config(parse(&["a.jpg"]), &file);
        let config = args.pipeline_config();
        assert_eq!(config.preview_max_dimension, 320);
        assert_eq!(config.render_target, RenderTarget::Source);
        assert_eq!(config.model_file, "masks.onnx");
        assert_eq!(config.input_size, 160);
        assert_eq!(config.layout, TensorLayout::Nchw);
        assert_eq!(args.format(), OutputFormat::Json);
    }

    #[test]
    fn test_flags_override_config() {
        let file: AppConfig = toml::from_str(
            r"
[preview]
max_dimension = 320

[detector]
min_confidence = 0.9

[output]
format = 'json'
",
        )
        .unwrap();

        let args = AnnotateArgs::with_config(
            parse(&[
                "--preview-max",
                "640",
                "--min-confidence",
                "0.5",
                "--format",
                "jsonl",
                "--layout",
                "nchw",
                "a.jpg",
            ]),
            &file,
        );
        let config = args.pipeline_config();
        assert_eq!(config.preview_max_dimension, 640);
        assert!((config.min_face_confidence - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.layout, TensorLayout::Nchw);
        assert_eq!(args.format(), OutputFormat::Jsonl);
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn stub_pipeline(classifier: StubClassifier) -> Pipeline {
        Pipeline::new(
            PipelineConfig::default(),
            Arc::new(FsImageSource::new()),
            Arc::new(StubDetectorProvider::with_regions(vec![FaceRegion::new(
                10.0, 10.0, 40.0, 40.0,
            )])),
            Arc::new(classifier),
        )
        .unwrap()
    }

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(80, 60, Rgb([120, 90, 60]))
            .save(&path)
            .unwrap();
        path
    }

    fn annotate_files(
        classifier: StubClassifier,
        files: &[PathBuf],
        argv: &[&str],
        format: OutputFormat,
    ) -> (Result<AnnotateResult>, String) {
        let buffer = SharedBuffer::default();
        let output = JsonOutput::new(Box::new(buffer.clone()), format, false);
        let mut full = vec!["-q"];
        full.extend_from_slice(argv);
        let args = parse(&full);

        let result = process_images(&stub_pipeline(classifier), files, &output, &args);
        (result, buffer.contents())
    }

    #[test]
    fn test_masked_faces_exit_success_and_write_next_to_input() {
        let dir = TempDir::new().unwrap();
        let files = vec![write_png(dir.path(), "a.png"), write_png(dir.path(), "b.png")];

        let (result, json) = annotate_files(
            StubClassifier::fixed(&[0.9, 0.1]),
            &files,
            &[],
            OutputFormat::Jsonl,
        );
        let result = result.unwrap();

        assert_eq!(result.exit_code, ExitCode::Success);
        assert_eq!(result.processed, 2);
        assert_eq!(result.skipped, 0);
        assert_eq!(result.no_mask_faces, 0);
        assert!(dir.path().join("a.annotated.png").is_file());
        assert!(dir.path().join("b.annotated.png").is_file());

        let lines: Vec<_> = json.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["mask_count"], 1);
        assert_eq!(first["no_mask_count"], 0);
    }

    #[test]
    fn test_unmasked_face_exits_with_no_mask_code() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        let files = vec![write_png(dir.path(), "crowd.png")];

        let (result, _) = annotate_files(
            StubClassifier::fixed(&[0.2, 0.8]),
            &files,
            &["--output-dir", out.to_str().unwrap()],
            OutputFormat::Jsonl,
        );
        let result = result.unwrap();

        assert_eq!(result.exit_code, ExitCode::NoMask);
        assert_eq!(result.no_mask_faces, 1);

        let annotated = out.join("crowd.annotated.png");
        assert!(annotated.is_file());
        assert!(!dir.path().join("crowd.annotated.png").exists());
        // Default render target is the preview of the 80x60 input
        assert_eq!(image::image_dimensions(&annotated).unwrap(), (80, 60));
    }

    #[test]
    fn test_undecodable_file_is_skipped_with_error_code() {
        let dir = TempDir::new().unwrap();
        let broken = dir.path().join("broken.png");
        std::fs::write(&broken, b"not a png").unwrap();
        let files = vec![broken, write_png(dir.path(), "good.png")];

        let (result, json) = annotate_files(
            StubClassifier::fixed(&[0.9, 0.1]),
            &files,
            &[],
            OutputFormat::Jsonl,
        );
        let result = result.unwrap();

        assert_eq!(result.exit_code, ExitCode::Error);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.processed, 1);
        assert!(dir.path().join("good.annotated.png").is_file());
        assert!(!dir.path().join("broken.annotated.png").exists());
        assert_eq!(json.lines().count(), 1);
    }

    #[test]
    fn test_fatal_error_flushes_output_and_fails() {
        let dir = TempDir::new().unwrap();
        let files = vec![write_png(dir.path(), "a.png")];

        let (result, json) = annotate_files(
            StubClassifier::failing_inference("engine crashed"),
            &files,
            &[],
            OutputFormat::Json,
        );

        let err = format!("{:#}", result.err().unwrap());
        assert!(err.contains("Failed to annotate"), "{err}");
        assert!(err.contains("engine crashed"), "{err}");
        assert_eq!(json.trim(), "[]");
        assert!(!dir.path().join("a.annotated.png").exists());
    }
}
