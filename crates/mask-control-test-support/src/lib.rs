//! Test support utilities for mask-control.
//!
//! Provides deterministic stand-ins for the detector and classifier backends,
//! recording sinks and synthetic image builders.
//!
//! # Example
//!
//! ```
//! use mask_control_core::FaceRegion;
//! use mask_control_test_support::{MockImageSource, StubClassifier, StubDetectorProvider, SyntheticImageBuilder};
//!
//! let source = MockImageSource::new().with_image("photo.jpg", SyntheticImageBuilder::scene(1000, 800));
//! let detectors = StubDetectorProvider::with_regions(vec![FaceRegion::new(100.0, 100.0, 720.0, 720.0)]);
//! let classifier = StubClassifier::fixed(&[0.92, 0.08]);
//! # let _ = (source, detectors, classifier);
//! ```

mod builders;
mod mocks;

pub use builders::SyntheticImageBuilder;
pub use mocks::{
    MockImageSource, MockProgressSink, MockResultOutput, StubClassifier, StubDetectorProvider,
};
