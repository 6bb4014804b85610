//! Configuration file support for mask-control.
//!
//! Supports TOML configuration from:
//! - XDG config: `~/.config/mask-control/config.toml` (lowest priority)
//! - Project-local: `.mask-control.toml` (searched up directory tree)
//! - CLI flags (highest priority, applied separately)

use std::path::{Path, PathBuf};

use mask_control_core::{PipelineConfig, TensorLayout};
use serde::Deserialize;
use tracing::{debug, info};

/// Top-level configuration structure.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General options.
    pub general: GeneralConfig,
    /// Preview and render target settings.
    pub preview: PreviewConfig,
    /// Model asset settings.
    pub models: ModelsConfig,
    /// Face detector settings.
    pub detector: DetectorConfig,
    /// Classifier input settings.
    pub classifier: ClassifierConfig,
    /// Annotation drawing settings.
    pub annotate: AnnotateConfig,
    /// Output formatting settings.
    pub output: OutputConfig,
}

/// General configuration options.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Recurse into subdirectories by default.
    pub recursive: Option<bool>,
}

/// Preview configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Cap on the longer side of the preview.
    pub max_dimension: Option<u32>,
    /// Draw onto the full-resolution image instead of the preview.
    pub full_resolution: Option<bool>,
}

/// Model asset configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Custom models directory path.
    pub dir: Option<PathBuf>,
    /// Detector weights file name.
    pub detector_file: Option<String>,
    /// Classifier model file name.
    pub model_file: Option<String>,
    /// Labels file name.
    pub labels_file: Option<String>,
}

/// Face detector configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum face detection confidence.
    pub min_confidence: Option<f32>,
}

/// Classifier configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Square input resolution of the model.
    pub input_size: Option<u32>,
    /// Tensor layout: "nhwc" or "nchw".
    pub layout: Option<String>,
}

/// Annotation configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct AnnotateConfig {
    /// TTF/OTF font for label text.
    pub font_path: Option<PathBuf>,
}

/// Output formatting configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format: "json" or "jsonl".
    pub format: Option<String>,
    /// Pretty-print JSON output.
    pub pretty: Option<bool>,
    /// Directory for rendered images.
    pub dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from XDG and project-local files.
    ///
    /// Priority (lowest to highest):
    /// 1. XDG config: `~/.config/mask-control/config.toml`
    /// 2. Project-local: `.mask-control.toml` (searched up from cwd)
    ///
    /// Missing files are silently ignored. Invalid values are logged as
    /// warnings and dropped from their file, so a lower layer still applies.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(xdg_path) = xdg_config_path() {
            if xdg_path.exists() {
                info!("Loading XDG config: {}", xdg_path.display());
                if let Some(xdg_config) = load_file(&xdg_path) {
                    config.apply_layer(xdg_config, &xdg_path);
                }
            } else {
                debug!("XDG config not found: {}", xdg_path.display());
            }
        }

        if let Some(project_path) = find_project_config() {
            info!("Loading project config: {}", project_path.display());
            if let Some(project_config) = load_file(&project_path) {
                config.apply_layer(project_config, &project_path);
            }
        }

        config
    }

    /// Drops the invalid values of `layer`, then merges it over `self`.
    fn apply_layer(&mut self, mut layer: Self, path: &Path) {
        for problem in layer.drop_invalid() {
            eprintln!("warning: {problem} (in {}, ignored)", path.display());
        }
        self.merge(layer);
    }

    /// Parsed tensor layout, if one is configured and valid.
    pub fn layout(&self) -> Option<TensorLayout> {
        self.classifier
            .layout
            .as_deref()
            .and_then(|s| s.parse().ok())
    }

    /// Default pipeline settings with the asset file names from `[models]`.
    pub fn pipeline_defaults(&self) -> PipelineConfig {
        let mut pipeline = PipelineConfig::default();
        if let Some(ref f) = self.models.detector_file {
            pipeline.detector_file.clone_from(f);
        }
        if let Some(ref f) = self.models.model_file {
            pipeline.model_file.clone_from(f);
        }
        if let Some(ref f) = self.models.labels_file {
            pipeline.labels_file.clone_from(f);
        }
        pipeline
    }

    /// Clears every out-of-range value and describes what was cleared.
    fn drop_invalid(&mut self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.preview.max_dimension == Some(0) {
            self.preview.max_dimension = None;
            problems.push("preview.max_dimension must be greater than 0".to_string());
        }
        if self.classifier.input_size == Some(0) {
            self.classifier.input_size = None;
            problems.push("classifier.input_size must be greater than 0".to_string());
        }
        if let Some(t) = self.detector.min_confidence {
            if !(0.0..=1.0).contains(&t) {
                self.detector.min_confidence = None;
                problems.push(format!("detector.min_confidence must be 0.0-1.0, got {t}"));
            }
        }
        if let Some(Err(e)) = self
            .classifier
            .layout
            .as_deref()
            .map(str::parse::<TensorLayout>)
        {
            self.classifier.layout = None;
            problems.push(format!("classifier.layout: {e}"));
        }
        if let Some(f) = self
            .output
            .format
            .take_if(|f| !matches!(f.as_str(), "json" | "jsonl"))
        {
            problems.push(format!("output.format must be 'json' or 'jsonl', got '{f}'"));
        }

        problems
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` when present.
    fn merge(&mut self, other: Self) {
        self.general.recursive = other.general.recursive.or(self.general.recursive);

        self.preview.max_dimension = other.preview.max_dimension.or(self.preview.max_dimension);
        self.preview.full_resolution = other
            .preview
            .full_resolution
            .or(self.preview.full_resolution);

        self.models.dir = other.models.dir.or_else(|| self.models.dir.take());
        self.models.detector_file = other
            .models
            .detector_file
            .or_else(|| self.models.detector_file.take());
        self.models.model_file = other
            .models
            .model_file
            .or_else(|| self.models.model_file.take());
        self.models.labels_file = other
            .models
            .labels_file
            .or_else(|| self.models.labels_file.take());

        self.detector.min_confidence = other
            .detector
            .min_confidence
            .or(self.detector.min_confidence);

        self.classifier.input_size = other.classifier.input_size.or(self.classifier.input_size);
        self.classifier.layout = other
            .classifier
            .layout
            .or_else(|| self.classifier.layout.take());

        self.annotate.font_path = other
            .annotate
            .font_path
            .or_else(|| self.annotate.font_path.take());

        self.output.format = other.output.format.or_else(|| self.output.format.take());
        self.output.pretty = other.output.pretty.or(self.output.pretty);
        self.output.dir = other.output.dir.or_else(|| self.output.dir.take());
    }
}

/// Get the XDG config file path.
fn xdg_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mask-control").join("config.toml"))
}

/// Find project-local config by searching up from current directory.
fn find_project_config() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_in_parents(&cwd)
}

/// Search for `.mask-control.toml` in the given directory and its parents.
fn find_config_in_parents(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);

    while let Some(dir) = current {
        let config_path = dir.join(".mask-control.toml");
        if config_path.exists() {
            return Some(config_path);
        }
        current = dir.parent();
    }

    None
}

/// Load and parse a TOML config file.
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Failed to read config file {}: {}", path.display(), e);
            return None;
        }
    };

    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config() {
        let config: AppConfig = toml::from_str("").expect("parse empty config");
        assert!(config.preview.max_dimension.is_none());
        assert!(config.models.dir.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r"
[general]
recursive = true

[preview]
max_dimension = 800
full_resolution = false

[models]
dir = '/opt/mask-control'
detector_file = 'face.safetensors'
model_file = 'masks.onnx'
labels_file = 'classes.txt'

[detector]
min_confidence = 0.6

[classifier]
input_size = 160
layout = 'nchw'

[annotate]
font_path = '/usr/share/fonts/DejaVuSans.ttf'

[output]
format = 'json'
pretty = true
dir = 'annotated'
";
        let config: AppConfig = toml::from_str(toml).expect("parse full config");

        assert_eq!(config.general.recursive, Some(true));
        assert_eq!(config.preview.max_dimension, Some(800));
        assert_eq!(config.preview.full_resolution, Some(false));
        assert_eq!(config.models.dir, Some(PathBuf::from("/opt/mask-control")));
        assert_eq!(config.models.model_file.as_deref(), Some("masks.onnx"));
        assert_eq!(config.detector.min_confidence, Some(0.6));
        assert_eq!(config.classifier.input_size, Some(160));
        assert_eq!(config.layout(), Some(TensorLayout::Nchw));
        assert_eq!(config.output.format.as_deref(), Some("json"));
        assert_eq!(config.output.pretty, Some(true));
        assert_eq!(config.output.dir, Some(PathBuf::from("annotated")));

        let mut checked = config.clone();
        assert!(checked.drop_invalid().is_empty());
        assert_eq!(checked.preview.max_dimension, Some(800));
    }

    #[test]
    fn test_merge_overrides_present_values() {
        let mut base: AppConfig = toml::from_str(
            r"
[preview]
max_dimension = 400

[models]
dir = '/base/models'
model_file = 'base.onnx'
",
        )
        .expect("parse base");

        let project: AppConfig = toml::from_str(
            r"
[preview]
max_dimension = 640

[classifier]
layout = 'nchw'
",
        )
        .expect("parse project");

        base.merge(project);

        assert_eq!(base.preview.max_dimension, Some(640));
        assert_eq!(base.models.dir, Some(PathBuf::from("/base/models")));
        assert_eq!(base.models.model_file.as_deref(), Some("base.onnx"));
        assert_eq!(base.layout(), Some(TensorLayout::Nchw));
    }

    #[test]
    fn test_merge_empty_override_preserves_base() {
        let mut base: AppConfig = toml::from_str(
            r"
[output]
format = 'json'
",
        )
        .expect("parse base");

        base.merge(AppConfig::default());

        assert_eq!(base.output.format.as_deref(), Some("json"));
    }

    #[test]
    fn test_invalid_field_type_handled() {
        let toml = r#"
[preview]
max_dimension = "large"
"#;
        let result: Result<AppConfig, _> = toml::from_str(toml);
        assert!(result.is_err(), "type mismatch should return error");
    }

    #[test]
    fn test_drop_invalid_zero_preview_dimension() {
        let mut config = AppConfig::default();
        config.preview.max_dimension = Some(0);
        config.preview.full_resolution = Some(true);

        let problems = config.drop_invalid();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("preview.max_dimension"));
        assert_eq!(config.preview.max_dimension, None);
        assert_eq!(config.preview.full_resolution, Some(true));
    }

    #[test]
    fn test_drop_invalid_min_confidence_out_of_range() {
        let mut config = AppConfig::default();
        config.detector.min_confidence = Some(1.5);
        assert!(config.drop_invalid()[0].contains("detector.min_confidence"));
        assert_eq!(config.detector.min_confidence, None);
    }

    #[test]
    fn test_drop_invalid_unknown_layout() {
        let mut config = AppConfig::default();
        config.classifier.layout = Some("chw".to_string());
        assert!(config.drop_invalid()[0].contains("classifier.layout"));
        assert_eq!(config.classifier.layout, None);
        assert_eq!(config.layout(), None);
    }

    #[test]
    fn test_drop_invalid_output_format() {
        let mut config = AppConfig::default();
        config.output.format = Some("xml".to_string());
        config.output.pretty = Some(true);
        assert!(config.drop_invalid()[0].contains("output.format"));
        assert_eq!(config.output.format, None);
        assert_eq!(config.output.pretty, Some(true));
    }

    #[test]
    fn test_drop_invalid_reports_every_field() {
        let mut config: AppConfig = toml::from_str(
            r"
[preview]
max_dimension = 0

[classifier]
input_size = 0
layout = 'planar'

[output]
format = 'csv'
",
        )
        .expect("parse config");

        assert_eq!(config.drop_invalid().len(), 4);
        assert!(config.drop_invalid().is_empty());
    }

    #[test]
    fn test_invalid_project_value_keeps_lower_layer() {
        let mut config = AppConfig::default();
        let xdg: AppConfig = toml::from_str(
            r"
[preview]
max_dimension = 320

[detector]
min_confidence = 0.6

[output]
format = 'json'
",
        )
        .expect("parse xdg");
        let project: AppConfig = toml::from_str(
            r"
[preview]
max_dimension = 0

[detector]
min_confidence = 2.0

[classifier]
input_size = 160

[output]
format = 'yaml'
",
        )
        .expect("parse project");

        config.apply_layer(xdg, Path::new("config.toml"));
        config.apply_layer(project, Path::new(".mask-control.toml"));

        assert_eq!(config.preview.max_dimension, Some(320));
        assert_eq!(config.detector.min_confidence, Some(0.6));
        assert_eq!(config.output.format.as_deref(), Some("json"));
        assert_eq!(config.classifier.input_size, Some(160));
    }

    #[test]
    fn test_find_config_in_parents() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(".mask-control.toml"), "").unwrap();

        let found = find_config_in_parents(&nested).unwrap();
        assert_eq!(found, dir.path().join(".mask-control.toml"));
    }
}
