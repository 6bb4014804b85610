//! Core domain types for mask classification.

mod region;
mod result;
mod scores;

pub use region::{CropRect, FaceRegion};
pub use result::{
    FaceOutcome, FaceStatus, ImageDimensions, ImageInfo, PipelineReport, RenderedImage,
};
pub use scores::{format_percent, LabelScores, Verdict, MASK_COLOR, NO_MASK_COLOR};
