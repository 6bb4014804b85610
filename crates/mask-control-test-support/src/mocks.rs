//! Deterministic implementations of the core ports.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use image::DynamicImage;
use mask_control_core::ports::{
    Classifier, DetectorProvider, FaceDetector, ImageSource, InputSize, ModelInput,
    PipelineStage, ProgressEvent, ProgressSink, ResultOutput,
};
use mask_control_core::{FaceRegion, ImageInfo, PipelineError, PipelineReport, Result};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory `ImageSource` keyed by reference.
///
/// Unknown references fail with [`PipelineError::Decode`].
#[derive(Default)]
pub struct MockImageSource {
    images: HashMap<String, DynamicImage>,
    loads: Mutex<Vec<String>>,
}

impl MockImageSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `image` under `reference`.
    #[must_use]
    pub fn with_image(mut self, reference: &str, image: DynamicImage) -> Self {
        self.images.insert(reference.to_string(), image);
        self
    }

    /// References passed to `load`, in call order.
    #[must_use]
    pub fn loads(&self) -> Vec<String> {
        lock(&self.loads).clone()
    }
}

impl ImageSource for MockImageSource {
    fn load(&self, reference: &str) -> Result<ImageInfo> {
        lock(&self.loads).push(reference.to_string());
        self.images
            .get(reference)
            .map(|image| ImageInfo::new(reference, image.clone()))
            .ok_or_else(|| PipelineError::Decode(format!("no image registered as '{reference}'")))
    }
}

#[derive(Default)]
struct LeaseCounters {
    acquired: usize,
    released: usize,
    detections: usize,
}

#[derive(Clone)]
enum DetectorBehavior {
    Regions(Vec<FaceRegion>),
    FailDetect(String),
    FailAcquire(String),
}

/// `DetectorProvider` that returns fixed regions and counts leases.
pub struct StubDetectorProvider {
    behavior: DetectorBehavior,
    counters: Arc<Mutex<LeaseCounters>>,
}

impl StubDetectorProvider {
    /// Every detection returns `regions`, in this order.
    #[must_use]
    pub fn with_regions(regions: Vec<FaceRegion>) -> Self {
        Self::from_behavior(DetectorBehavior::Regions(regions))
    }

    /// Detects no faces.
    #[must_use]
    pub fn no_faces() -> Self {
        Self::with_regions(vec![])
    }

    /// Acquisition succeeds but `detect` fails with [`PipelineError::Detection`].
    #[must_use]
    pub fn failing_detect(message: &str) -> Self {
        Self::from_behavior(DetectorBehavior::FailDetect(message.to_string()))
    }

    /// `acquire` fails with [`PipelineError::Detection`].
    #[must_use]
    pub fn failing_acquire(message: &str) -> Self {
        Self::from_behavior(DetectorBehavior::FailAcquire(message.to_string()))
    }

    fn from_behavior(behavior: DetectorBehavior) -> Self {
        Self {
            behavior,
            counters: Arc::new(Mutex::new(LeaseCounters::default())),
        }
    }

    /// Number of handles handed out.
    #[must_use]
    pub fn acquired(&self) -> usize {
        lock(&self.counters).acquired
    }

    /// Number of handles released.
    #[must_use]
    pub fn released(&self) -> usize {
        lock(&self.counters).released
    }

    /// Number of `detect` calls across all handles.
    #[must_use]
    pub fn detections(&self) -> usize {
        lock(&self.counters).detections
    }
}

impl DetectorProvider for StubDetectorProvider {
    fn acquire(&self) -> Result<Box<dyn FaceDetector + '_>> {
        if let DetectorBehavior::FailAcquire(message) = &self.behavior {
            return Err(PipelineError::Detection(message.clone()));
        }
        lock(&self.counters).acquired += 1;
        Ok(Box::new(StubDetector {
            behavior: self.behavior.clone(),
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct StubDetector {
    behavior: DetectorBehavior,
    counters: Arc<Mutex<LeaseCounters>>,
}

impl FaceDetector for StubDetector {
    fn detect(&mut self, _image: &ImageInfo) -> Result<Vec<FaceRegion>> {
        lock(&self.counters).detections += 1;
        match &self.behavior {
            DetectorBehavior::Regions(regions) => Ok(regions.clone()),
            DetectorBehavior::FailDetect(message) | DetectorBehavior::FailAcquire(message) => {
                Err(PipelineError::Detection(message.clone()))
            }
        }
    }

    fn release(&mut self) {
        lock(&self.counters).released += 1;
    }
}

enum Scoring {
    Fixed(Vec<f32>),
    /// Mask score is the mean red intensity of the crop.
    RedChannel,
    FailLoad(String),
    FailInference(String),
}

/// `Classifier` with scripted output.
pub struct StubClassifier {
    labels: Vec<String>,
    scoring: Scoring,
    input_size: InputSize,
    inputs: Mutex<Vec<ModelInput>>,
}

impl StubClassifier {
    fn from_scoring(scoring: Scoring) -> Self {
        Self {
            labels: vec!["mask".to_string(), "no_mask".to_string()],
            scoring,
            input_size: InputSize::square(32),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Returns `scores` for every face, index-aligned with the labels.
    #[must_use]
    pub fn fixed(scores: &[f32]) -> Self {
        Self::from_scoring(Scoring::Fixed(scores.to_vec()))
    }

    /// Scores each face by its redness: `mask` = mean red in `[0, 1]`,
    /// `no_mask` = the remainder.
    #[must_use]
    pub fn red_channel() -> Self {
        Self::from_scoring(Scoring::RedChannel)
    }

    /// Every call fails with [`PipelineError::ModelLoad`].
    #[must_use]
    pub fn failing_load(message: &str) -> Self {
        Self::from_scoring(Scoring::FailLoad(message.to_string()))
    }

    /// `infer` fails with [`PipelineError::Inference`].
    #[must_use]
    pub fn failing_inference(message: &str) -> Self {
        Self::from_scoring(Scoring::FailInference(message.to_string()))
    }

    /// Replaces the label list.
    #[must_use]
    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        self.labels = labels.iter().map(ToString::to_string).collect();
        self
    }

    /// Sets the reported input resolution.
    #[must_use]
    pub const fn with_input_size(mut self, side: u32) -> Self {
        self.input_size = InputSize::square(side);
        self
    }

    /// Number of `infer` calls.
    #[must_use]
    pub fn infer_count(&self) -> usize {
        lock(&self.inputs).len()
    }

    /// Every tensor passed to `infer`, in call order.
    #[must_use]
    pub fn inputs(&self) -> Vec<ModelInput> {
        lock(&self.inputs).clone()
    }
}

impl Classifier for StubClassifier {
    fn input_size(&self) -> InputSize {
        self.input_size
    }

    fn labels(&self) -> Result<&[String]> {
        match &self.scoring {
            Scoring::FailLoad(message) => Err(PipelineError::ModelLoad(message.clone())),
            _ => Ok(&self.labels),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn infer(&self, input: &ModelInput) -> Result<Vec<f32>> {
        lock(&self.inputs).push(input.clone());
        match &self.scoring {
            Scoring::Fixed(scores) => Ok(scores.clone()),
            Scoring::RedChannel => {
                let reds: Vec<f32> = input.data.iter().step_by(3).copied().collect();
                let mean = reds.iter().sum::<f32>() / reds.len().max(1) as f32;
                let mask = (mean + 1.0) / 2.0;
                Ok(vec![mask, 1.0 - mask])
            }
            Scoring::FailLoad(message) => Err(PipelineError::ModelLoad(message.clone())),
            Scoring::FailInference(message) => Err(PipelineError::Inference(message.clone())),
        }
    }
}

/// `ProgressSink` that records every event.
#[derive(Default)]
pub struct MockProgressSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl MockProgressSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded event.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        lock(&self.events).clone()
    }

    /// Stage transitions in order.
    #[must_use]
    pub fn stages(&self) -> Vec<PipelineStage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Stage(stage) => Some(stage),
                _ => None,
            })
            .collect()
    }

    /// User-facing notices (`opened` / `closed`) in face order.
    #[must_use]
    pub fn notices(&self) -> Vec<&'static str> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::FaceClassified { verdict, .. } => Some(verdict.notice()),
                _ => None,
            })
            .collect()
    }

    /// Indices of skipped faces.
    #[must_use]
    pub fn skipped(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::FaceSkipped { index, .. } => Some(index),
                _ => None,
            })
            .collect()
    }

    /// The published preview, if any.
    #[must_use]
    pub fn preview(&self) -> Option<DynamicImage> {
        self.events().into_iter().find_map(|e| match e {
            ProgressEvent::PreviewReady { preview } => Some(preview),
            _ => None,
        })
    }
}

impl ProgressSink for MockProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        lock(&self.events).push(event);
    }
}

/// `ResultOutput` that captures reports.
#[derive(Default)]
pub struct MockResultOutput {
    reports: Mutex<Vec<PipelineReport>>,
    flushes: Mutex<usize>,
}

impl MockResultOutput {
    /// Creates an empty output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every written report.
    #[must_use]
    pub fn reports(&self) -> Vec<PipelineReport> {
        lock(&self.reports).clone()
    }

    /// Number of `flush` calls.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        *lock(&self.flushes)
    }
}

impl ResultOutput for MockResultOutput {
    fn write(&self, report: &PipelineReport) -> anyhow::Result<()> {
        lock(&self.reports).push(report.clone());
        Ok(())
    }

    fn flush(&self) -> anyhow::Result<()> {
        *lock(&self.flushes) += 1;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mask_control_core::ImageDimensions;

    #[test]
    fn test_image_source_unknown_reference_is_decode_error() {
        let source = MockImageSource::new();
        assert!(matches!(source.load("missing.jpg"), Err(PipelineError::Decode(_))));
        assert_eq!(source.loads(), vec!["missing.jpg"]);
    }

    #[test]
    fn test_image_source_returns_registered_image() {
        let source =
            MockImageSource::new().with_image("a.png", DynamicImage::new_rgb8(4, 3));
        let info = source.load("a.png").unwrap();
        assert_eq!((info.width, info.height, info.path.as_str()), (4, 3, "a.png"));
    }

    #[test]
    fn test_detector_counts_leases() {
        let provider = StubDetectorProvider::with_regions(vec![FaceRegion::new(1.0, 2.0, 3.0, 4.0)]);
        let image = ImageInfo::new("x", DynamicImage::new_rgb8(10, 10));
        {
            let mut handle = provider.acquire().unwrap();
            assert_eq!(handle.detect(&image).unwrap().len(), 1);
            handle.release();
        }
        assert_eq!(provider.acquired(), 1);
        assert_eq!(provider.released(), 1);
        assert_eq!(provider.detections(), 1);
    }

    #[test]
    fn test_failing_acquire_hands_out_nothing() {
        let provider = StubDetectorProvider::failing_acquire("no device");
        assert!(provider.acquire().is_err());
        assert_eq!(provider.acquired(), 0);
    }

    #[test]
    fn test_red_channel_scoring() {
        let classifier = StubClassifier::red_channel();
        let input = ModelInput {
            width: 1,
            height: 1,
            data: vec![1.0, -1.0, -1.0],
        };
        assert_eq!(classifier.infer(&input).unwrap(), vec![1.0, 0.0]);
        assert_eq!(classifier.infer_count(), 1);
    }

    #[test]
    fn test_failing_load_fails_labels() {
        let classifier = StubClassifier::failing_load("labels.txt not found");
        assert!(matches!(classifier.labels(), Err(PipelineError::ModelLoad(_))));
    }

    #[test]
    fn test_result_output_captures_reports() {
        let output = MockResultOutput::new();
        let report = PipelineReport {
            path: "a.jpg".into(),
            source: ImageDimensions::new(10, 10),
            rendered: ImageDimensions::new(10, 10),
            scale: 1.0,
            faces: vec![],
        };
        output.write(&report).unwrap();
        output.flush().unwrap();
        assert_eq!(output.reports().len(), 1);
        assert_eq!(output.flush_count(), 1);
    }
}
