//! ONNX Runtime backend for the mask classifier.

// Quantized pixels are rounded and clamped to 0..=255 before the cast
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};

use anyhow::{Context, Result};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue};
use ort::value::{Tensor, TensorElementType};
use tracing::{debug, info};

use super::load_labels;
use crate::config::{LabelNames, PipelineConfig, TensorLayout};
use crate::error::PipelineError;
use crate::ports::{Classifier, InputSize, ModelInput};

/// Element type of the classifier's image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputElement {
    /// Normalized floats in `[-1, 1]`.
    Float,
    /// Raw `0..=255` pixel values, as fed to quantized models.
    Quantized,
}

/// Shape and element type the model expects for its image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InputGeometry {
    size: InputSize,
    layout: TensorLayout,
    element: InputElement,
}

impl InputGeometry {
    /// Reads the geometry from the model's declared input dimensions.
    ///
    /// A 4-d input whose last axis is 3 is NHWC, one whose second axis is 3 is
    /// NCHW. Dynamic (non-positive) dimensions and any other rank fall back to
    /// the configured values.
    fn from_dims(
        dims: &[i64],
        element: InputElement,
        fallback_size: InputSize,
        fallback_layout: TensorLayout,
    ) -> Self {
        let fallback = Self {
            size: fallback_size,
            layout: fallback_layout,
            element,
        };
        let &[_, d1, d2, d3] = dims else {
            return fallback;
        };

        let layout = match (d1, d3) {
            (_, 3) => TensorLayout::Nhwc,
            (3, _) => TensorLayout::Nchw,
            _ => fallback_layout,
        };
        let (height, width) = match layout {
            TensorLayout::Nhwc => (d1, d2),
            TensorLayout::Nchw => (d2, d3),
        };
        let side = |dim: i64, default: u32| {
            u32::try_from(dim)
                .ok()
                .filter(|&d| d > 0)
                .unwrap_or(default)
        };

        Self {
            size: InputSize {
                width: side(width, fallback_size.width),
                height: side(height, fallback_size.height),
            },
            layout,
            element,
        }
    }
}

/// Loaded session plus its label list.
struct Engine {
    session: Mutex<Session>,
    input_name: String,
    geometry: InputGeometry,
    labels: Vec<String>,
}

/// Mask classifier backed by an ONNX model and a labels file.
///
/// Both assets are loaded on first use and the session is kept for the life
/// of the classifier. A load failure is cached and reported on every call.
///
/// The input resolution, tensor layout and element type are read from the
/// model. The configured size and layout are used only where the model leaves
/// a dimension dynamic.
pub struct OnnxClassifier {
    model_path: PathBuf,
    labels_path: PathBuf,
    label_names: LabelNames,
    input_size: InputSize,
    layout: TensorLayout,
    intra_threads: usize,
    engine: OnceLock<Result<Engine, String>>,
}

impl OnnxClassifier {
    /// Creates a classifier for the assets inside `models_dir`.
    #[must_use]
    pub fn new(config: &PipelineConfig, models_dir: &Path) -> Self {
        Self {
            model_path: config.model_path(models_dir),
            labels_path: config.labels_path(models_dir),
            label_names: config.labels.clone(),
            input_size: InputSize::square(config.input_size),
            layout: config.layout,
            intra_threads: 4,
            engine: OnceLock::new(),
        }
    }

    /// Sets the number of threads the engine may use per inference.
    #[must_use]
    pub const fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads;
        self
    }

    /// Returns true once the assets have been loaded successfully.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self.engine.get(), Some(Ok(_)))
    }

    fn engine(&self) -> crate::Result<&Engine> {
        self.engine
            .get_or_init(|| self.load().map_err(|e| format!("{e:#}")))
            .as_ref()
            .map_err(|e| PipelineError::ModelLoad(e.clone()))
    }

    fn load(&self) -> Result<Engine> {
        let labels = load_labels(&self.labels_path, &self.label_names)?;

        if !self.model_path.exists() {
            anyhow::bail!("Classifier model not found: {}", self.model_path.display());
        }

        info!("Loading mask classifier from {}", self.model_path.display());
        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(<ort::Error>::from)
            .context("Failed to set optimization level")?
            .with_intra_threads(self.intra_threads)
            .map_err(<ort::Error>::from)
            .context("Failed to set intra threads")?
            .commit_from_file(&self.model_path)
            .with_context(|| format!("Failed to load model: {}", self.model_path.display()))?;

        let input = session
            .inputs()
            .first()
            .context("Classifier model has no inputs")?;
        let input_type = input.dtype();
        debug!("Classifier model input: {input_type:?}");

        let element = match input_type.tensor_type() {
            Some(TensorElementType::Float32) => InputElement::Float,
            Some(TensorElementType::Uint8) => InputElement::Quantized,
            other => anyhow::bail!("Unsupported classifier input type: {other:?}"),
        };
        let dims = input_type
            .tensor_shape()
            .map(|shape| shape.to_vec())
            .unwrap_or_default();
        let geometry = InputGeometry::from_dims(&dims, element, self.input_size, self.layout);
        let input_name = input.name().to_string();

        debug!(
            "Classifier input '{input_name}': {}x{} {:?} {:?}, {} labels",
            geometry.size.width,
            geometry.size.height,
            geometry.layout,
            geometry.element,
            labels.len()
        );

        Ok(Engine {
            session: Mutex::new(session),
            input_name,
            geometry,
            labels,
        })
    }
}

impl Classifier for OnnxClassifier {
    /// The model's input resolution once loaded, the configured size before.
    fn input_size(&self) -> InputSize {
        match self.engine.get() {
            Some(Ok(engine)) => engine.geometry.size,
            _ => self.input_size,
        }
    }

    fn labels(&self) -> crate::Result<&[String]> {
        Ok(&self.engine()?.labels)
    }

    fn infer(&self, input: &ModelInput) -> crate::Result<Vec<f32>> {
        let engine = self.engine()?;
        let value = input_value(input, engine.geometry).map_err(|e| PipelineError::inference(&e))?;

        let mut session = engine
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        run_session(&mut session, &engine.input_name, value)
            .map_err(|e| PipelineError::inference(&e))
    }
}

/// Builds the input tensor in the layout and element type the model expects.
fn input_value(input: &ModelInput, geometry: InputGeometry) -> Result<SessionInputValue<'static>> {
    let shape = input.shape(geometry.layout);
    let data = input.to_layout(geometry.layout);

    let value: SessionInputValue<'static> = match geometry.element {
        InputElement::Float => {
            let array = Array4::from_shape_vec(shape, data)
                .context("Input does not match the model shape")?;
            Tensor::from_array(array)
                .context("Failed to create input tensor")?
                .into()
        }
        InputElement::Quantized => {
            let pixels = data.into_iter().map(quantize).collect();
            let array = Array4::from_shape_vec(shape, pixels)
                .context("Input does not match the model shape")?;
            Tensor::from_array(array)
                .context("Failed to create input tensor")?
                .into()
        }
    };
    Ok(value)
}

/// Maps a normalized `[-1, 1]` value back to its `0..=255` pixel.
#[inline]
fn quantize(value: f32) -> u8 {
    value.mul_add(127.5, 127.5).round().clamp(0.0, 255.0) as u8
}

/// Runs one forward pass and flattens the first output.
///
/// Quantized `u8` outputs are scaled into `[0, 1]`.
fn run_session(
    session: &mut Session,
    input_name: &str,
    value: SessionInputValue<'static>,
) -> Result<Vec<f32>> {
    let outputs = session
        .run(vec![(input_name, value)])
        .context("Classifier inference failed")?;

    if let Ok(scores) = outputs[0].try_extract_array::<f32>() {
        return Ok(scores.iter().copied().collect());
    }

    let quantized = outputs[0]
        .try_extract_array::<u8>()
        .context("Classifier output is neither f32 nor u8")?;
    Ok(quantized.iter().map(|&q| f32::from(q) / 255.0).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK: InputSize = InputSize {
        width: 224,
        height: 224,
    };

    fn geometry(dims: &[i64], layout: TensorLayout) -> InputGeometry {
        InputGeometry::from_dims(dims, InputElement::Float, FALLBACK, layout)
    }

    #[test]
    fn test_missing_assets_fail_as_model_load() {
        let classifier = OnnxClassifier::new(&PipelineConfig::default(), Path::new("/nonexistent"));
        assert_eq!(classifier.input_size(), InputSize::square(224));

        assert!(matches!(classifier.labels(), Err(PipelineError::ModelLoad(_))));

        let input = ModelInput {
            width: 224,
            height: 224,
            data: vec![0.0; 224 * 224 * 3],
        };
        assert!(matches!(
            classifier.infer(&input),
            Err(PipelineError::ModelLoad(_))
        ));
        assert!(!classifier.is_loaded());
        assert_eq!(classifier.input_size(), InputSize::square(224));
    }

    #[test]
    fn test_nhwc_model_dims_override_config() {
        let g = geometry(&[1, 96, 128, 3], TensorLayout::Nchw);
        assert_eq!(g.layout, TensorLayout::Nhwc);
        assert_eq!(
            g.size,
            InputSize {
                width: 128,
                height: 96,
            }
        );
    }

    #[test]
    fn test_nchw_model_dims_override_config() {
        let g = geometry(&[1, 3, 160, 160], TensorLayout::Nhwc);
        assert_eq!(g.layout, TensorLayout::Nchw);
        assert_eq!(g.size, InputSize::square(160));
    }

    #[test]
    fn test_dynamic_dims_use_config() {
        let g = geometry(&[-1, -1, -1, 3], TensorLayout::Nchw);
        assert_eq!(g.layout, TensorLayout::Nhwc);
        assert_eq!(g.size, FALLBACK);

        let g = geometry(&[1, 3, -1, 112], TensorLayout::Nhwc);
        assert_eq!(g.layout, TensorLayout::Nchw);
        assert_eq!(
            g.size,
            InputSize {
                width: 112,
                height: 224,
            }
        );
    }

    #[test]
    fn test_unknown_rank_uses_config() {
        for dims in [&[][..], &[1, 224, 224][..], &[1, 1, 224, 224, 3][..]] {
            let g = geometry(dims, TensorLayout::Nchw);
            assert_eq!(g.layout, TensorLayout::Nchw);
            assert_eq!(g.size, FALLBACK);
        }
    }

    #[test]
    fn test_ambiguous_channels_keep_configured_layout() {
        let g = geometry(&[1, 4, 64, 64], TensorLayout::Nchw);
        assert_eq!(g.layout, TensorLayout::Nchw);
        assert_eq!(g.size, InputSize::square(64));
    }

    #[test]
    fn test_quantize_restores_pixels() {
        for pixel in [0_u8, 1, 127, 128, 200, 255] {
            let normalized = (f32::from(pixel) - 127.5) / 127.5;
            assert_eq!(quantize(normalized), pixel);
        }
        assert_eq!(quantize(-3.0), 0);
        assert_eq!(quantize(3.0), 255);
    }

    #[test]
    fn test_quantized_input_tensor_builds() {
        let input = ModelInput {
            width: 2,
            height: 2,
            data: vec![0.0; 12],
        };
        let geometry = InputGeometry {
            size: InputSize::square(2),
            layout: TensorLayout::Nchw,
            element: InputElement::Quantized,
        };
        assert!(input_value(&input, geometry).is_ok());
    }
}
