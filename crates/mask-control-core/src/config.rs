//! Static configuration record handed to the pipeline at construction.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default cap on the longer side of the preview image.
pub const DEFAULT_PREVIEW_MAX_DIMENSION: u32 = 500;

/// Default square input resolution of the classification model.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Names of the two labels the classifier is expected to emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelNames {
    /// Label for a face wearing a mask.
    pub mask: String,
    /// Label for a face without a mask.
    pub no_mask: String,
}

impl Default for LabelNames {
    fn default() -> Self {
        Self {
            mask: "mask".to_string(),
            no_mask: "no_mask".to_string(),
        }
    }
}

/// Memory layout of the image tensor fed to the classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, height, width, 3]`, as exported from TensorFlow.
    #[default]
    Nhwc,
    /// `[1, 3, height, width]`, as exported from PyTorch.
    Nchw,
}

impl std::str::FromStr for TensorLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nhwc" => Ok(Self::Nhwc),
            "nchw" => Ok(Self::Nchw),
            other => Err(format!("unknown tensor layout '{other}', expected nhwc or nchw")),
        }
    }
}

/// Which image the annotations are composited onto.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderTarget {
    /// The display-sized preview (what a user sees first).
    #[default]
    Preview,
    /// The full-resolution source image.
    Source,
}

/// Settings for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Recognized label names.
    pub labels: LabelNames,
    /// Cap on the longer side of the preview.
    pub preview_max_dimension: u32,
    /// Image the annotations are drawn onto.
    pub render_target: RenderTarget,
    /// Distance between the label baseline and the top of the face box.
    pub text_margin: f32,
    /// Rectangle stroke width in display pixels.
    pub stroke_width: f32,
    /// Rectangle corner radius in display pixels.
    pub corner_radius: f32,
    /// Font size is the display width of the face box divided by this.
    pub font_size_divisor: f32,
    /// Optional TTF/OTF font for label text. A built-in bitmap font is used otherwise.
    pub font_path: Option<PathBuf>,
    /// Model file name inside the models directory.
    pub model_file: String,
    /// Labels file name inside the models directory.
    pub labels_file: String,
    /// Face detector weights file name inside the models directory.
    pub detector_file: String,
    /// Square input resolution of the classifier.
    pub input_size: u32,
    /// Tensor layout of the classifier input.
    pub layout: TensorLayout,
    /// Minimum detector confidence for a face to be reported.
    pub min_face_confidence: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            labels: LabelNames::default(),
            preview_max_dimension: DEFAULT_PREVIEW_MAX_DIMENSION,
            render_target: RenderTarget::Preview,
            text_margin: 8.0,
            stroke_width: 4.0,
            corner_radius: 2.0,
            font_size_divisor: 8.0,
            font_path: None,
            model_file: "mask_classifier.onnx".to_string(),
            labels_file: "labels.txt".to_string(),
            detector_file: "blazeface.safetensors".to_string(),
            input_size: DEFAULT_INPUT_SIZE,
            layout: TensorLayout::Nhwc,
            min_face_confidence: 0.75,
        }
    }
}

impl PipelineConfig {
    /// Sets the preview cap.
    #[must_use]
    pub const fn with_preview_max_dimension(mut self, max: u32) -> Self {
        self.preview_max_dimension = max;
        self
    }

    /// Sets the render target.
    #[must_use]
    pub const fn with_render_target(mut self, target: RenderTarget) -> Self {
        self.render_target = target;
        self
    }

    /// Sets the label font.
    #[must_use]
    pub fn with_font_path(mut self, path: impl AsRef<Path>) -> Self {
        self.font_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the classifier input resolution and layout.
    #[must_use]
    pub const fn with_model_input(mut self, input_size: u32, layout: TensorLayout) -> Self {
        self.input_size = input_size;
        self.layout = layout;
        self
    }

    /// Path of the classifier model inside `models_dir`.
    #[must_use]
    pub fn model_path(&self, models_dir: &Path) -> PathBuf {
        models_dir.join(&self.model_file)
    }

    /// Path of the labels file inside `models_dir`.
    #[must_use]
    pub fn labels_path(&self, models_dir: &Path) -> PathBuf {
        models_dir.join(&self.labels_file)
    }

    /// Path of the detector weights inside `models_dir`.
    #[must_use]
    pub fn detector_path(&self, models_dir: &Path) -> PathBuf {
        models_dir.join(&self.detector_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.preview_max_dimension, 500);
        assert_eq!(config.labels.mask, "mask");
        assert_eq!(config.labels.no_mask, "no_mask");
        assert!((config.stroke_width - 4.0).abs() < f32::EPSILON);
        assert!((config.text_margin - 8.0).abs() < f32::EPSILON);
        assert_eq!(config.layout, TensorLayout::Nhwc);
        assert_eq!(config.render_target, RenderTarget::Preview);
    }

    #[test]
    fn test_asset_paths() {
        let config = PipelineConfig::default();
        let dir = Path::new("/models");
        assert_eq!(
            config.model_path(dir),
            PathBuf::from("/models/mask_classifier.onnx")
        );
        assert_eq!(config.labels_path(dir), PathBuf::from("/models/labels.txt"));
        assert_eq!(
            config.detector_path(dir),
            PathBuf::from("/models/blazeface.safetensors")
        );
    }

    #[test]
    fn test_layout_parsing() {
        assert_eq!("NHWC".parse::<TensorLayout>(), Ok(TensorLayout::Nhwc));
        assert_eq!("nchw".parse::<TensorLayout>(), Ok(TensorLayout::Nchw));
        assert!("chw".parse::<TensorLayout>().is_err());
    }
}
