//! Face regions and the integer crops derived from them.

// Pixel coordinates are truncated the same way integer bitmap cropping does
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// A face bounding box in source image pixel coordinates.
///
/// Values are reported by the detector as-is and may extend past the image
/// edges. Use [`FaceRegion::clamp_to`] before touching pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    /// Left edge.
    pub left: f32,
    /// Top edge.
    pub top: f32,
    /// Box width.
    pub width: f32,
    /// Box height.
    pub height: f32,
}

impl FaceRegion {
    /// Creates a new region.
    #[must_use]
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Right edge (`left + width`).
    #[must_use]
    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    /// Bottom edge (`top + height`).
    #[must_use]
    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    /// Maps the region into another coordinate space by per-axis scale factors.
    #[must_use]
    pub fn scaled(&self, scale_x: f32, scale_y: f32) -> Self {
        Self {
            left: self.left * scale_x,
            top: self.top * scale_y,
            width: self.width * scale_x,
            height: self.height * scale_y,
        }
    }

    /// Clamps the region to an image of the given size.
    ///
    /// A box running past the right or bottom edge is shortened to end at the
    /// edge. A negative origin is moved to zero and the box shrinks by the same
    /// amount.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyRegion`] if no pixels remain, e.g. when the
    /// box starts at or past the image edge.
    pub fn clamp_to(&self, image_width: u32, image_height: u32) -> Result<CropRect> {
        let empty = || PipelineError::EmptyRegion {
            region: *self,
            image_width,
            image_height,
        };

        let (x, width) = clamp_axis(self.left, self.width, image_width).ok_or_else(empty)?;
        let (y, height) = clamp_axis(self.top, self.height, image_height).ok_or_else(empty)?;

        Ok(CropRect {
            x,
            y,
            width,
            height,
        })
    }
}

impl fmt::Display for FaceRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.1}, {:.1}) {:.1}x{:.1}",
            self.left, self.top, self.width, self.height
        )
    }
}

/// Clamps one axis of a box to `0..limit`, returning `(start, length)`.
///
/// Float to integer casts saturate at the `i64` range, and the arithmetic is
/// done in `i128` so no finite box can overflow.
fn clamp_axis(origin: f32, extent: f32, limit: u32) -> Option<(u32, u32)> {
    let limit = i128::from(limit);
    let mut start = i128::from(origin as i64);
    let end = i128::from((origin + extent) as i64);

    let mut length = if end > limit {
        limit - start
    } else {
        i128::from(extent as i64)
    };

    if start < 0 {
        length += start;
        start = 0;
    }

    if start >= limit || length <= 0 {
        return None;
    }

    let length = length.min(limit - start);
    Some((start as u32, length as u32))
}

/// An integer crop rectangle guaranteed to lie inside its image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width, always non-zero.
    pub width: u32,
    /// Height, always non-zero.
    pub height: u32,
}

impl CropRect {
    /// The largest square centered inside this rectangle, relative to its origin.
    ///
    /// The longer side is trimmed symmetrically; an odd remainder leaves the
    /// extra pixel on the right or bottom.
    #[must_use]
    pub fn center_square(&self) -> Self {
        let side = self.width.min(self.height);
        Self {
            x: (self.width - side) / 2,
            y: (self.height - side) / 2,
            width: side,
            height: side,
        }
    }
}
