//! Mask Control Core - face mask classification pipeline
//!
//! This crate contains the domain types, the ports the pipeline talks to, the
//! four pipeline stages (load, locate, classify, annotate), the orchestrator,
//! a last-submission-wins session worker and the default `BlazeFace` / ONNX
//! backends.

pub mod config;
pub mod domain;
pub mod error;
pub mod inference;
pub mod pipeline;
pub mod ports;
pub mod session;
pub mod stages;

pub use config::{LabelNames, PipelineConfig, RenderTarget, TensorLayout};
pub use domain::{
    CropRect, FaceOutcome, FaceRegion, FaceStatus, ImageDimensions, ImageInfo, LabelScores,
    PipelineReport, RenderedImage, Verdict,
};
pub use error::{PipelineError, Result};
pub use pipeline::Pipeline;
pub use ports::{
    Classifier, DetectorProvider, FaceDetector, ImageSource, ProgressEvent, ProgressSink,
    ResultOutput,
};
pub use session::{AnnotationSession, DisplaySlot, Displayed, SessionUpdate};
