//! Pipeline orchestrator: load, locate, classify, annotate.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{PipelineConfig, RenderTarget};
use crate::domain::{FaceOutcome, FaceStatus, ImageDimensions, PipelineReport, RenderedImage};
use crate::error::Result;
use crate::ports::{
    Classifier, DetectorProvider, ImageSource, PipelineStage, ProgressEvent, ProgressSink,
};
use crate::stages::{classify_region, load_font, make_preview, Annotator, DetectorLease, DisplayScale};

/// One image in, one annotated image out.
///
/// The pipeline holds no per-image state; `run` can be called any number of
/// times, but never concurrently for the same session (see
/// [`crate::AnnotationSession`]).
pub struct Pipeline {
    config: PipelineConfig,
    source: Arc<dyn ImageSource>,
    detectors: Arc<dyn DetectorProvider>,
    classifier: Arc<dyn Classifier>,
    annotator: Annotator,
}

impl Pipeline {
    /// Assembles a pipeline from its collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if a caption font is configured but cannot be loaded.
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn ImageSource>,
        detectors: Arc<dyn DetectorProvider>,
        classifier: Arc<dyn Classifier>,
    ) -> anyhow::Result<Self> {
        let mut annotator = Annotator::new(&config);
        if let Some(path) = &config.font_path {
            debug!("Loading caption font from {}", path.display());
            annotator = annotator.with_font(load_font(path)?);
        }

        Ok(Self {
            config,
            source,
            detectors,
            classifier,
            annotator,
        })
    }

    /// The configuration this pipeline was built with.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs one invocation for the image behind `reference`.
    ///
    /// Faces are classified and annotated in detector order. A face whose crop
    /// is empty is skipped and recorded in the report; any other error aborts
    /// the invocation. The detector handle is released on every path and the
    /// sink always sees a final [`PipelineStage::Idle`].
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`crate::PipelineError`].
    pub fn run(&self, reference: &str, progress: &dyn ProgressSink) -> Result<RenderedImage> {
        let result = self.run_stages(reference, progress);
        if let Err(e) = &result {
            warn!("Pipeline failed for {reference}: {e}");
        }
        progress.on_event(ProgressEvent::Stage(PipelineStage::Idle));
        result
    }

    fn run_stages(&self, reference: &str, progress: &dyn ProgressSink) -> Result<RenderedImage> {
        let stage = |stage: PipelineStage| {
            debug!("Stage: {stage:?}");
            progress.on_event(ProgressEvent::Stage(stage));
        };

        stage(PipelineStage::Loading);
        let source = self.source.load(reference)?;
        let preview = make_preview(&source.image, self.config.preview_max_dimension);
        progress.on_event(ProgressEvent::PreviewReady {
            preview: preview.clone(),
        });

        stage(PipelineStage::Detecting);
        let mut lease = DetectorLease::acquire(self.detectors.as_ref())?;
        let regions = lease.detect(&source)?;

        let (display, scale) = match self.config.render_target {
            RenderTarget::Preview => {
                let scale = DisplayScale::between(
                    source.dimensions(),
                    ImageDimensions::new(preview.width(), preview.height()),
                );
                (preview, scale)
            }
            RenderTarget::Source => (source.image.clone(), DisplayScale::IDENTITY),
        };

        let labels = &self.config.labels;
        let total = regions.len();
        let mut faces = Vec::with_capacity(total);
        let mut annotations = Vec::with_capacity(total);

        for (index, region) in regions.into_iter().enumerate() {
            stage(PipelineStage::Classifying { index, total });

            let status = match classify_region(self.classifier.as_ref(), &source.image, &region) {
                Ok(scores) => {
                    let verdict = scores.verdict(labels);
                    let caption = verdict.caption(labels);
                    info!("Face {index} at {region}: {caption}");

                    annotations.push(self.annotator.annotation(
                        scale.apply(&region),
                        &verdict,
                        caption.clone(),
                    ));
                    progress.on_event(ProgressEvent::FaceClassified { index, verdict });

                    FaceStatus::Classified {
                        scores,
                        verdict,
                        caption,
                    }
                }
                Err(e) if !e.is_fatal() => {
                    warn!("Skipping face {index}: {e}");
                    progress.on_event(ProgressEvent::FaceSkipped { index, region });
                    FaceStatus::Skipped {
                        reason: e.to_string(),
                    }
                }
                Err(e) => return Err(e),
            };

            faces.push(FaceOutcome {
                index,
                region,
                status,
            });
        }

        stage(PipelineStage::Annotating);
        let image = self.annotator.render(&display, &annotations);

        stage(PipelineStage::Displaying);
        let report = PipelineReport {
            path: source.path.clone(),
            source: source.dimensions(),
            rendered: ImageDimensions::new(image.width(), image.height()),
            scale: scale.x,
            faces,
        };

        Ok(RenderedImage { image, report })
    }
}
