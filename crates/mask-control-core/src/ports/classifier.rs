//! Mask classifier port.

use crate::config::TensorLayout;
use crate::error::Result;

/// Spatial input resolution of a classification model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSize {
    /// Input width in pixels.
    pub width: u32,
    /// Input height in pixels.
    pub height: u32,
}

impl InputSize {
    /// A square input of `side` pixels.
    #[must_use]
    pub const fn square(side: u32) -> Self {
        Self {
            width: side,
            height: side,
        }
    }
}

/// A preprocessed face crop, normalized to `[-1, 1]`.
///
/// Values are stored row-major as interleaved RGB (`height × width × 3`).
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    /// Tensor width.
    pub width: u32,
    /// Tensor height.
    pub height: u32,
    /// Interleaved RGB values.
    pub data: Vec<f32>,
}

impl ModelInput {
    /// Tensor shape including the batch dimension for the given layout.
    #[must_use]
    pub const fn shape(&self, layout: TensorLayout) -> [usize; 4] {
        let (h, w) = (self.height as usize, self.width as usize);
        match layout {
            TensorLayout::Nhwc => [1, h, w, 3],
            TensorLayout::Nchw => [1, 3, h, w],
        }
    }

    /// Values reordered for the given layout.
    #[must_use]
    pub fn to_layout(&self, layout: TensorLayout) -> Vec<f32> {
        match layout {
            TensorLayout::Nhwc => self.data.clone(),
            TensorLayout::Nchw => {
                let plane = self.data.len() / 3;
                let mut planar = vec![0.0; self.data.len()];
                for (i, rgb) in self.data.chunks_exact(3).enumerate() {
                    planar[i] = rgb[0];
                    planar[plane + i] = rgb[1];
                    planar[2 * plane + i] = rgb[2];
                }
                planar
            }
        }
    }
}

/// Opaque classification model plus its ordered label list.
///
/// Implementations may load their assets lazily; the first failing call
/// reports [`crate::PipelineError::ModelLoad`].
pub trait Classifier: Send + Sync {
    /// Input resolution the model expects.
    fn input_size(&self) -> InputSize;

    /// Label names, index-aligned with the output vector.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PipelineError::ModelLoad`] if the labels asset is
    /// missing or malformed.
    fn labels(&self) -> Result<&[String]>;

    /// Runs the model on one preprocessed crop and returns raw class scores.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PipelineError::ModelLoad`] if the model cannot be
    /// loaded and [`crate::PipelineError::Inference`] if the engine fails.
    fn infer(&self, input: &ModelInput) -> Result<Vec<f32>>;
}
