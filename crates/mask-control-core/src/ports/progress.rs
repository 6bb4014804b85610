//! Progress reporting port for the presentation layer.

use image::DynamicImage;

use crate::domain::{FaceRegion, Verdict};

/// Stages of one pipeline invocation, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// No invocation in flight.
    Idle,
    /// Decoding the image and building the preview.
    Loading,
    /// Running the face detector.
    Detecting,
    /// Classifying one face.
    Classifying {
        /// Face index in detector order (0-based).
        index: usize,
        /// Number of detected faces.
        total: usize,
    },
    /// Drawing annotations.
    Annotating,
    /// Handing the rendered image to the presentation layer.
    Displaying,
}

/// Events emitted during an invocation.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The pipeline entered a new stage.
    Stage(PipelineStage),
    /// The display-sized preview is ready, before detection starts.
    PreviewReady {
        /// The unannotated preview.
        preview: DynamicImage,
    },
    /// A face was classified. Carries the user-facing notice.
    FaceClassified {
        /// Face index in detector order.
        index: usize,
        /// The mask / no-mask decision.
        verdict: Verdict,
    },
    /// A face was skipped because its crop was empty.
    FaceSkipped {
        /// Face index in detector order.
        index: usize,
        /// The region as reported by the detector.
        region: FaceRegion,
    },
}

/// Port for receiving progress events.
pub trait ProgressSink: Send + Sync {
    /// Called when a progress event occurs.
    fn on_event(&self, event: ProgressEvent);
}

/// A sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_event(&self, _event: ProgressEvent) {}
}
