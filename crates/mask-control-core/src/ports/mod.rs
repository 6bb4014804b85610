//! Port definitions for hexagonal architecture.
//!
//! These traits define the boundaries between the pipeline and the image
//! loader, the detection and inference backends, and the presentation layer.

mod classifier;
mod detector;
mod image_source;
mod progress;
mod result_output;

pub use classifier::{Classifier, InputSize, ModelInput};
pub use detector::{DetectorProvider, FaceDetector};
pub use image_source::ImageSource;
pub use progress::{NullProgressSink, PipelineStage, ProgressEvent, ProgressSink};
pub use result_output::ResultOutput;
