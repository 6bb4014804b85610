//! Error taxonomy for a single pipeline invocation.

use thiserror::Error;

use crate::domain::FaceRegion;

/// Result alias used at every port and stage boundary.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Errors raised while loading, detecting, classifying or annotating an image.
///
/// Only [`PipelineError::EmptyRegion`] is recoverable: the offending face is
/// skipped and the remaining faces are still processed. Every other variant
/// aborts the invocation.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The image reference could not be read or decoded.
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// The face detector failed or could not be acquired.
    #[error("face detection failed: {0}")]
    Detection(String),

    /// The model or labels asset is missing or malformed.
    #[error("failed to load model assets: {0}")]
    ModelLoad(String),

    /// A face region has no pixels left after clamping to the image bounds.
    #[error("face region {region} is empty inside a {image_width}x{image_height} image")]
    EmptyRegion {
        /// The region as reported by the detector.
        region: FaceRegion,
        /// Width of the image the region was clamped against.
        image_width: u32,
        /// Height of the image the region was clamped against.
        image_height: u32,
    },

    /// The inference engine failed while running the model.
    #[error("inference failed: {0}")]
    Inference(String),
}

impl PipelineError {
    /// Returns true if this error aborts the whole invocation.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::EmptyRegion { .. })
    }

    /// Wraps an `anyhow` error chain as a decode failure.
    #[must_use]
    pub fn decode(err: &anyhow::Error) -> Self {
        Self::Decode(format!("{err:#}"))
    }

    /// Wraps an `anyhow` error chain as a detector failure.
    #[must_use]
    pub fn detection(err: &anyhow::Error) -> Self {
        Self::Detection(format!("{err:#}"))
    }

    /// Wraps an `anyhow` error chain as a model asset failure.
    #[must_use]
    pub fn model_load(err: &anyhow::Error) -> Self {
        Self::ModelLoad(format!("{err:#}"))
    }

    /// Wraps an `anyhow` error chain as an inference failure.
    #[must_use]
    pub fn inference(err: &anyhow::Error) -> Self {
        Self::Inference(format!("{err:#}"))
    }
}
