//! Images flowing through the pipeline and the per-invocation report.

use image::{DynamicImage, GenericImageView, RgbaImage};
use serde::{Deserialize, Serialize};

use super::{FaceRegion, LabelScores, Verdict};

/// A decoded source image together with the reference it was loaded from.
#[derive(Debug, Clone)]
pub struct ImageInfo {
    /// Reference the image was loaded from (path or synthetic name).
    pub path: String,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Decoded image data.
    pub image: DynamicImage,
}

impl ImageInfo {
    /// Wraps an already decoded image.
    #[must_use]
    pub fn new(path: impl Into<String>, image: DynamicImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            path: path.into(),
            width,
            height,
            image,
        }
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> ImageDimensions {
        ImageDimensions::new(self.width, self.height)
    }
}

impl std::ops::Deref for ImageInfo {
    type Target = DynamicImage;

    fn deref(&self) -> &Self::Target {
        &self.image
    }
}

/// Image dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ImageDimensions {
    /// Creates new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// What happened to one detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceOutcome {
    /// Position in detector order (0-based).
    pub index: usize,
    /// Region as reported by the detector, in source coordinates.
    pub region: FaceRegion,
    /// Classification, or the reason the face was skipped.
    #[serde(flatten)]
    pub status: FaceStatus,
}

/// Classification result for one face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FaceStatus {
    /// The face was classified and annotated.
    Classified {
        /// Raw scores per label.
        scores: LabelScores,
        /// Winner of the mask / no-mask decision.
        verdict: Verdict,
        /// Text drawn next to the face.
        caption: String,
    },
    /// The face was skipped because its crop was empty.
    Skipped {
        /// Why the face was skipped.
        reason: String,
    },
}

impl FaceOutcome {
    /// Returns the verdict for a classified face.
    #[must_use]
    pub const fn verdict(&self) -> Option<&Verdict> {
        match &self.status {
            FaceStatus::Classified { verdict, .. } => Some(verdict),
            FaceStatus::Skipped { .. } => None,
        }
    }
}

/// Serializable summary of one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Reference of the analyzed image.
    pub path: String,
    /// Dimensions of the decoded source image.
    pub source: ImageDimensions,
    /// Dimensions of the image the annotations were drawn on.
    pub rendered: ImageDimensions,
    /// Horizontal factor mapping source coordinates to rendered ones.
    pub scale: f32,
    /// Faces in detector order.
    pub faces: Vec<FaceOutcome>,
}

impl PipelineReport {
    /// Number of faces classified as wearing a mask.
    #[must_use]
    pub fn mask_count(&self) -> usize {
        self.faces
            .iter()
            .filter(|f| f.verdict().is_some_and(Verdict::is_mask))
            .count()
    }

    /// Number of faces classified as not wearing a mask.
    #[must_use]
    pub fn no_mask_count(&self) -> usize {
        self.faces
            .iter()
            .filter(|f| f.verdict().is_some_and(|v| !v.is_mask()))
            .count()
    }

    /// Number of faces skipped because of an empty crop.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.faces.iter().filter(|f| f.verdict().is_none()).count()
    }
}

/// Final output of one invocation: the composited image plus its report.
#[derive(Debug, Clone)]
pub struct RenderedImage {
    /// The display image with every annotation drawn on it.
    pub image: RgbaImage,
    /// What was detected and how each face was classified.
    pub report: PipelineReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(index: usize, status: FaceStatus) -> FaceOutcome {
        FaceOutcome {
            index,
            region: FaceRegion::new(0.0, 0.0, 10.0, 10.0),
            status,
        }
    }

    fn classified(verdict: Verdict) -> FaceStatus {
        FaceStatus::Classified {
            scores: LabelScores::default(),
            verdict,
            caption: String::new(),
        }
    }

    #[test]
    fn test_image_info_dimensions() {
        let info = ImageInfo::new("test.png", DynamicImage::new_rgb8(40, 30));
        assert_eq!(info.dimensions(), ImageDimensions::new(40, 30));
        assert_eq!(info.path, "test.png");
    }

    #[test]
    fn test_report_counts() {
        let report = PipelineReport {
            path: "x.jpg".into(),
            source: ImageDimensions::new(10, 10),
            rendered: ImageDimensions::new(10, 10),
            scale: 1.0,
            faces: vec![
                outcome(0, classified(Verdict::Mask { score: 0.9 })),
                outcome(1, classified(Verdict::NoMask { score: 0.7 })),
                outcome(2, classified(Verdict::NoMask { score: 0.5 })),
                outcome(
                    3,
                    FaceStatus::Skipped {
                        reason: "empty".into(),
                    },
                ),
            ],
        };
        assert_eq!(report.mask_count(), 1);
        assert_eq!(report.no_mask_count(), 2);
        assert_eq!(report.skipped_count(), 1);
    }
}
