//! Synthetic image builders for testing.

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use mask_control_core::ImageInfo;

/// A filled rectangle painted onto a synthetic image: `(x, y, width, height, rgb)`.
pub type Patch = (u32, u32, u32, u32, [u8; 3]);

/// Builder for creating synthetic test images.
pub struct SyntheticImageBuilder;

impl SyntheticImageBuilder {
    /// A smooth two-axis color gradient.
    ///
    /// Every pixel differs from its neighbors, so resampling and drawing are
    /// both visible in pixel comparisons.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn scene(width: u32, height: u32) -> DynamicImage {
        let img = RgbImage::from_fn(width, height, |x, y| {
            let r = (u32::from(u8::MAX) * x / width.max(1)) as u8;
            let g = (u32::from(u8::MAX) * y / height.max(1)) as u8;
            Rgb([r, g, 128])
        });
        DynamicImage::ImageRgb8(img)
    }

    /// A single-color image.
    #[must_use]
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    /// A single-color background with rectangular patches painted on top.
    ///
    /// Patches are clipped to the image.
    #[must_use]
    pub fn with_patches(width: u32, height: u32, background: [u8; 3], patches: &[Patch]) -> DynamicImage {
        let mut img = RgbImage::from_pixel(width, height, Rgb(background));
        for &(px, py, pw, ph, rgb) in patches {
            for y in py..py.saturating_add(ph).min(height) {
                for x in px..px.saturating_add(pw).min(width) {
                    img.put_pixel(x, y, Rgb(rgb));
                }
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    /// A high-contrast grayscale checkerboard.
    #[must_use]
    pub fn checkerboard(width: u32, height: u32, cell_size: u32) -> DynamicImage {
        let cell = cell_size.max(1);
        let img = GrayImage::from_fn(width, height, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        });
        DynamicImage::ImageLuma8(img)
    }

    /// Wraps an image as loaded from `reference`.
    #[must_use]
    pub fn info(reference: &str, image: DynamicImage) -> ImageInfo {
        ImageInfo::new(reference, image)
    }
}
