//! Face Locator stage: scoped access to a detector handle.

use tracing::debug;

use crate::domain::{FaceRegion, ImageInfo};
use crate::error::Result;
use crate::ports::{DetectorProvider, FaceDetector};

/// A detector handle leased for one invocation.
///
/// The handle is released when the lease is dropped, so every exit path of
/// the pipeline (success, early return, panic unwinding) gives it back.
pub struct DetectorLease<'a> {
    handle: Box<dyn FaceDetector + 'a>,
}

impl<'a> DetectorLease<'a> {
    /// Acquires a handle from `provider`.
    ///
    /// # Errors
    ///
    /// Propagates the provider's [`crate::PipelineError::Detection`].
    pub fn acquire(provider: &'a dyn DetectorProvider) -> Result<Self> {
        let handle = provider.acquire()?;
        debug!("Acquired face detector");
        Ok(Self { handle })
    }

    /// Runs detection on the full-resolution image.
    ///
    /// # Errors
    ///
    /// Propagates the detector's [`crate::PipelineError::Detection`].
    pub fn detect(&mut self, image: &ImageInfo) -> Result<Vec<FaceRegion>> {
        let regions = self.handle.detect(image)?;
        debug!("Detected {} face(s) in {}", regions.len(), image.path);
        Ok(regions)
    }
}

impl Drop for DetectorLease<'_> {
    fn drop(&mut self) {
        self.handle.release();
        debug!("Released face detector");
    }
}
