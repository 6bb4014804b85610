//! Face detector port.

use crate::domain::{FaceRegion, ImageInfo};
use crate::error::Result;

/// A face detector handle, valid for one pipeline invocation.
///
/// Handles are obtained from a [`DetectorProvider`] and must be released once
/// the invocation ends. The pipeline guarantees the release on every exit path.
pub trait FaceDetector {
    /// Detects faces in the full-resolution image.
    ///
    /// Regions are in source pixel coordinates and may extend past the image
    /// edges. Order is up to the detector.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PipelineError::Detection`] if the backend fails.
    fn detect(&mut self, image: &ImageInfo) -> Result<Vec<FaceRegion>>;

    /// Releases the resources held by this handle.
    ///
    /// Called exactly once; the handle is not used afterwards.
    fn release(&mut self);
}

/// Hands out detector handles, one per invocation.
pub trait DetectorProvider: Send + Sync {
    /// Acquires a detector handle.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PipelineError::Detection`] if the backend cannot be
    /// initialized.
    fn acquire(&self) -> Result<Box<dyn FaceDetector + '_>>;
}
