//! Image Loader stage: display-sized preview and the source-to-display mapping.

#![allow(clippy::cast_precision_loss)]

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::domain::{FaceRegion, ImageDimensions};

/// Scales `image` so its longer side is at most `max_dimension`.
///
/// Aspect ratio is preserved and images already within the cap are returned
/// unchanged (never upscaled).
#[must_use]
pub fn make_preview(image: &DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if max_dimension == 0 || width.max(height) <= max_dimension {
        return image.clone();
    }

    image.resize(max_dimension, max_dimension, FilterType::Triangle)
}

/// Per-axis factors mapping source coordinates onto a rendered image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayScale {
    /// `display_width / source_width`.
    pub x: f32,
    /// `display_height / source_height`.
    pub y: f32,
}

impl DisplayScale {
    /// The identity mapping, used when rendering onto the source itself.
    pub const IDENTITY: Self = Self { x: 1.0, y: 1.0 };

    /// Scale between a source image and the image it is displayed as.
    #[must_use]
    pub fn between(source: ImageDimensions, display: ImageDimensions) -> Self {
        if source.width == 0 || source.height == 0 {
            return Self::IDENTITY;
        }
        Self {
            x: display.width as f32 / source.width as f32,
            y: display.height as f32 / source.height as f32,
        }
    }

    /// Maps a source-space region into display space. The region is not clamped.
    #[must_use]
    pub fn apply(&self, region: &FaceRegion) -> FaceRegion {
        region.scaled(self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_caps_longer_side() {
        let image = DynamicImage::new_rgb8(1000, 800);
        let preview = make_preview(&image, 500);
        assert_eq!(preview.dimensions(), (500, 400));

        let tall = DynamicImage::new_rgb8(300, 1200);
        assert_eq!(make_preview(&tall, 500).dimensions(), (125, 500));
    }

    #[test]
    fn test_preview_never_upscales() {
        let image = DynamicImage::new_rgb8(320, 240);
        let preview = make_preview(&image, 500);
        assert_eq!(preview.dimensions(), (320, 240));
    }

    #[test]
    fn test_scale_between_dimensions() {
        let scale = DisplayScale::between(
            ImageDimensions::new(1000, 800),
            ImageDimensions::new(500, 400),
        );
        assert!((scale.x - 0.5).abs() < f32::EPSILON);
        assert!((scale.y - 0.5).abs() < f32::EPSILON);

        let region = scale.apply(&FaceRegion::new(900.0, 700.0, 300.0, 300.0));
        assert_eq!(region, FaceRegion::new(450.0, 350.0, 150.0, 150.0));
    }

    #[test]
    fn test_scale_of_empty_source_is_identity() {
        let scale = DisplayScale::between(ImageDimensions::new(0, 0), ImageDimensions::new(5, 5));
        assert_eq!(scale, DisplayScale::IDENTITY);
    }
}
