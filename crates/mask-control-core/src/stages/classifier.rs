//! Region Classifier stage: crop, preprocess and score one face.

use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

use crate::domain::{FaceRegion, LabelScores};
use crate::error::{PipelineError, Result};
use crate::ports::{Classifier, InputSize, ModelInput};

/// Crops the square face patch for `region` out of `image`.
///
/// The region is clamped to the image bounds first, then the largest centered
/// square is taken so the model never sees a stretched face.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyRegion`] if nothing remains after clamping.
pub fn crop_face(image: &DynamicImage, region: &FaceRegion) -> Result<DynamicImage> {
    let rect = region.clamp_to(image.width(), image.height())?;
    let square = rect.center_square();

    Ok(image.crop_imm(
        rect.x + square.x,
        rect.y + square.y,
        square.width,
        square.height,
    ))
}

/// Resizes a face patch to the model input and normalizes it to `[-1, 1]`.
#[must_use]
pub fn preprocess(face: &DynamicImage, size: InputSize) -> ModelInput {
    let resized = face.resize_exact(size.width, size.height, FilterType::Nearest);
    let data = resized
        .to_rgb8()
        .pixels()
        .flat_map(|p| p.0.map(normalize))
        .collect();

    ModelInput {
        width: size.width,
        height: size.height,
        data,
    }
}

#[inline]
fn normalize(channel: u8) -> f32 {
    (f32::from(channel) - 127.5) / 127.5
}

/// Classifies one face region of the full-resolution image.
///
/// # Errors
///
/// - [`PipelineError::EmptyRegion`] if the clamped crop is empty (skip the face)
/// - [`PipelineError::ModelLoad`] if the model or labels cannot be loaded, or
///   the model emits a different number of scores than there are labels
/// - [`PipelineError::Inference`] if the engine fails
pub fn classify_region(
    classifier: &dyn Classifier,
    image: &DynamicImage,
    region: &FaceRegion,
) -> Result<LabelScores> {
    let face = crop_face(image, region)?;

    // Loads the model, so the input size below is the model's own
    let labels = classifier.labels()?;
    let input = preprocess(&face, classifier.input_size());
    let output = classifier.infer(&input)?;

    if output.len() != labels.len() {
        return Err(PipelineError::ModelLoad(format!(
            "model produced {} scores but the labels file lists {} labels",
            output.len(),
            labels.len()
        )));
    }

    let scores = LabelScores::from_output(labels, &output);
    debug!("Region {region}: {scores:?}");
    Ok(scores)
}
