//! Annotator stage: rounded face boxes and caption text.

// Drawing works in float display coordinates and truncates to pixels
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::debug;

use super::font::{self, ADVANCE, GLYPH_HEIGHT};
use crate::config::PipelineConfig;
use crate::domain::{FaceRegion, Verdict};

/// Loads a TTF/OTF font for caption text.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid font.
pub fn load_font(path: impl AsRef<Path>) -> Result<FontArc> {
    let path = path.as_ref();
    let data =
        std::fs::read(path).with_context(|| format!("Failed to read font: {}", path.display()))?;
    FontArc::try_from_vec(data)
        .map_err(|e| anyhow::anyhow!("Invalid font {}: {e}", path.display()))
}

/// One face box and caption, in display coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Unclamped face box mapped into display space.
    pub region: FaceRegion,
    /// Stroke and text color.
    pub color: Rgba<u8>,
    /// Caption, e.g. `mask: 92.0%`.
    pub text: String,
    /// Caption height in display pixels.
    pub font_size: f32,
}

/// Draws annotations onto a copy of the display image.
pub struct Annotator {
    font: Option<FontArc>,
    stroke_width: f32,
    corner_radius: f32,
    text_margin: f32,
    font_size_divisor: f32,
}

impl Annotator {
    /// Creates an annotator using the built-in bitmap font.
    #[must_use]
    pub const fn new(config: &PipelineConfig) -> Self {
        Self {
            font: None,
            stroke_width: config.stroke_width,
            corner_radius: config.corner_radius,
            text_margin: config.text_margin,
            font_size_divisor: config.font_size_divisor,
        }
    }

    /// Renders captions with `font` instead of the bitmap font.
    #[must_use]
    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    /// Builds the annotation for one classified face.
    #[must_use]
    pub fn annotation(&self, display_region: FaceRegion, verdict: &Verdict, text: String) -> Annotation {
        Annotation {
            region: display_region,
            color: verdict.color(),
            text,
            font_size: display_region.width / self.font_size_divisor,
        }
    }

    /// Composites every annotation onto a copy of `display`.
    ///
    /// With no annotations the result is pixel-identical to `display`.
    #[must_use]
    pub fn render(&self, display: &DynamicImage, annotations: &[Annotation]) -> RgbaImage {
        let mut canvas = display.to_rgba8();
        for annotation in annotations {
            self.draw(&mut canvas, annotation);
        }
        canvas
    }

    /// Draws one box and its caption. Anything outside the canvas is clipped.
    pub fn draw(&self, canvas: &mut RgbaImage, annotation: &Annotation) {
        draw_rounded_rect(
            canvas,
            &annotation.region,
            self.corner_radius,
            self.stroke_width,
            annotation.color,
        );

        let baseline = annotation.region.top - self.text_margin;
        let x = annotation.region.left;

        match &self.font {
            Some(font) => {
                let size = annotation.font_size.max(1.0);
                draw_text_mut(
                    canvas,
                    annotation.color,
                    x.round() as i32,
                    (baseline - size).round() as i32,
                    PxScale::from(size),
                    font,
                    &annotation.text,
                );
            }
            None => draw_bitmap_text(
                canvas,
                x,
                baseline,
                annotation.font_size,
                annotation.color,
                &annotation.text,
            ),
        }

        debug!("Drew '{}' at {}", annotation.text, annotation.region);
    }
}

/// Strokes the outline of a rounded rectangle.
///
/// A pixel is painted when its center lies within half the stroke width of
/// the rectangle's outline, measured with the rounded-box distance function.
fn draw_rounded_rect(
    canvas: &mut RgbaImage,
    region: &FaceRegion,
    radius: f32,
    stroke: f32,
    color: Rgba<u8>,
) {
    if !(region.width > 0.0 && region.height > 0.0) {
        return;
    }

    let half_w = region.width / 2.0;
    let half_h = region.height / 2.0;
    let center_x = region.left + half_w;
    let center_y = region.top + half_h;
    let radius = radius.clamp(0.0, half_w.min(half_h));
    let half_stroke = stroke / 2.0;

    let (width, height) = canvas.dimensions();
    let x_start = (region.left - half_stroke).floor().max(0.0) as u32;
    let y_start = (region.top - half_stroke).floor().max(0.0) as u32;
    let x_end = ((region.right() + half_stroke).ceil().max(0.0) as u32).min(width);
    let y_end = ((region.bottom() + half_stroke).ceil().max(0.0) as u32).min(height);

    for y in y_start..y_end {
        for x in x_start..x_end {
            let dx = x as f32 + 0.5 - center_x;
            let dy = y as f32 + 0.5 - center_y;
            let distance = rounded_box_distance(dx, dy, half_w, half_h, radius);
            if distance.abs() <= half_stroke {
                canvas.put_pixel(x, y, color);
            }
        }
    }
}

/// Signed distance from a point (relative to the box center) to a rounded box.
fn rounded_box_distance(dx: f32, dy: f32, half_w: f32, half_h: f32, radius: f32) -> f32 {
    let qx = dx.abs() - (half_w - radius);
    let qy = dy.abs() - (half_h - radius);
    let outside = qx.max(0.0).hypot(qy.max(0.0));
    let inside = qx.max(qy).min(0.0);
    outside + inside - radius
}

/// Draws `text` with the bitmap font, glyph bottoms resting on `baseline`.
fn draw_bitmap_text(
    canvas: &mut RgbaImage,
    x: f32,
    baseline: f32,
    font_size: f32,
    color: Rgba<u8>,
    text: &str,
) {
    // Seven glyph rows plus one row of spacing fill the em square
    let unit = (font_size / 8.0).max(1.0);
    let cell = unit.ceil() as u32;
    let top = baseline - unit * GLYPH_HEIGHT as f32;

    for (i, ch) in text.chars().enumerate() {
        let origin = x + unit * (i as f32) * ADVANCE as f32;
        for (col, row) in font::lit_cells(ch) {
            let cell_x = origin + unit * col as f32;
            let cell_y = top + unit * row as f32;
            let rect = Rect::at(cell_x.floor() as i32, cell_y.floor() as i32).of_size(cell, cell);
            draw_filled_rect_mut(canvas, rect, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MASK_COLOR, NO_MASK_COLOR};

    const BLANK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    fn blank(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, BLANK))
    }

    fn annotator() -> Annotator {
        Annotator::new(&PipelineConfig::default())
    }

    #[test]
    fn test_annotation_font_size_follows_box_width() {
        let annotation = annotator().annotation(
            FaceRegion::new(50.0, 50.0, 360.0, 360.0),
            &Verdict::Mask { score: 0.92 },
            "mask: 92.0%".into(),
        );
        assert!((annotation.font_size - 45.0).abs() < f32::EPSILON);
        assert_eq!(annotation.color, MASK_COLOR);
    }

    #[test]
    fn test_render_without_annotations_is_identity() {
        let display = blank(40, 30);
        let rendered = annotator().render(&display, &[]);
        assert_eq!(rendered, display.to_rgba8());
    }

    #[test]
    fn test_rounded_rect_strokes_edges_only() {
        let mut canvas = blank(100, 100).to_rgba8();
        let region = FaceRegion::new(20.0, 20.0, 60.0, 40.0);
        draw_rounded_rect(&mut canvas, &region, 2.0, 4.0, NO_MASK_COLOR);

        // Edge midpoints sit on the outline
        assert_eq!(canvas.get_pixel(20, 40), &NO_MASK_COLOR);
        assert_eq!(canvas.get_pixel(79, 40), &NO_MASK_COLOR);
        assert_eq!(canvas.get_pixel(50, 20), &NO_MASK_COLOR);
        assert_eq!(canvas.get_pixel(50, 59), &NO_MASK_COLOR);
        // Stroke extends two pixels outward
        assert_eq!(canvas.get_pixel(18, 40), &NO_MASK_COLOR);
        // Interior is untouched
        assert_eq!(canvas.get_pixel(50, 40), &BLANK);
        // The outer corner is rounded off
        assert_eq!(canvas.get_pixel(18, 18), &BLANK);
        assert_eq!(canvas.get_pixel(20, 20), &NO_MASK_COLOR);
    }

    #[test]
    fn test_rect_past_canvas_is_clipped() {
        let mut canvas = blank(50, 50).to_rgba8();
        let region = FaceRegion::new(30.0, 30.0, 100.0, 100.0);
        draw_rounded_rect(&mut canvas, &region, 2.0, 4.0, MASK_COLOR);
        assert_eq!(canvas.get_pixel(30, 40), &MASK_COLOR);
        assert_eq!(canvas.get_pixel(49, 49), &BLANK);
    }

    #[test]
    fn test_caption_is_drawn_above_box() {
        let a = annotator();
        let annotation = a.annotation(
            FaceRegion::new(10.0, 60.0, 80.0, 30.0),
            &Verdict::NoMask { score: 0.6 },
            "no_mask: 60.0%".into(),
        );
        let rendered = a.render(&blank(120, 100), &[annotation]);

        // Baseline at 60 - 8 = 52; the caption lives above it
        let above = (0..120)
            .flat_map(|x| (0..52).map(move |y| (x, y)))
            .filter(|&(x, y)| rendered.get_pixel(x, y) == &NO_MASK_COLOR)
            .count();
        assert!(above > 0);
        assert!((52..56).all(|y| (0..120).all(|x| rendered.get_pixel(x, y) == &BLANK)));
    }

    #[test]
    fn test_load_font_missing_file() {
        assert!(load_font("/nonexistent/font.ttf").is_err());
    }
}
