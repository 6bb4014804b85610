//! Image source port for decoding user-selected images.

use crate::domain::ImageInfo;
use crate::error::Result;

/// Port for turning an image reference into decoded pixels.
pub trait ImageSource: Send + Sync {
    /// Decodes the image behind `reference` (a path, URI or synthetic name).
    ///
    /// # Errors
    ///
    /// Returns [`crate::PipelineError::Decode`] if the reference cannot be
    /// read or is not a decodable raster image.
    fn load(&self, reference: &str) -> Result<ImageInfo>;
}
