//! `BlazeFace` face detector and its [`DetectorProvider`] adapter.
//!
//! The network follows "`BlazeFace`: Sub-millisecond Neural Face Detection on
//! Mobile GPUs" with the front-camera weights of hollance/BlazeFace-PyTorch
//! (batch norm folded into the convolution biases).

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{conv2d, Conv2d, Conv2dConfig, VarBuilder};
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::{debug, info};

use once_cell::sync::OnceCell;

use super::{get_device, load_weights};
use crate::domain::{FaceRegion, ImageInfo};
use crate::error::PipelineError;
use crate::ports::{DetectorProvider, FaceDetector};

/// Square input resolution of the network.
pub const INPUT_SIZE: usize = 128;

const NUM_ANCHORS: usize = 896;

/// Anchors on the 16x16 grid (two per cell); the rest sit on the 8x8 grid.
const ANCHORS_16: usize = 512;

const NMS_THRESHOLD: f32 = 0.3;

/// Stem and head tensors a front-camera checkpoint must carry.
const REQUIRED_TENSORS: [&str; 10] = [
    "conv0.weight",
    "conv0.bias",
    "classifier_8.weight",
    "classifier_8.bias",
    "classifier_16.weight",
    "classifier_16.bias",
    "regressor_8.weight",
    "regressor_8.bias",
    "regressor_16.weight",
    "regressor_16.bias",
];

/// `(in, out, stride)` of the blocks producing the 16x16 feature map.
const BACKBONE_16: [(usize, usize, usize); 11] = [
    (24, 24, 1),
    (24, 28, 1),
    (28, 32, 2),
    (32, 36, 1),
    (36, 42, 1),
    (42, 48, 2),
    (48, 56, 1),
    (56, 64, 1),
    (64, 72, 1),
    (72, 80, 1),
    (80, 88, 1),
];

/// `(in, out, stride)` of the blocks producing the 8x8 feature map.
const BACKBONE_8: [(usize, usize, usize); 5] = [
    (88, 96, 2),
    (96, 96, 1),
    (96, 96, 1),
    (96, 96, 1),
    (96, 96, 1),
];

/// A raw detection in normalized `[0, 1]` image coordinates.
#[derive(Debug, Clone, Copy)]
pub struct FaceDetection {
    /// `[x_min, y_min, x_max, y_max]`, not clamped to the image.
    pub bbox: [f32; 4],
    /// Sigmoid confidence.
    pub score: f32,
}

impl FaceDetection {
    /// Converts the box into source pixel coordinates.
    #[must_use]
    pub fn to_region(&self, width: u32, height: u32) -> FaceRegion {
        let (w, h) = (width as f32, height as f32);
        let [x_min, y_min, x_max, y_max] = self.bbox;
        FaceRegion::new(x_min * w, y_min * h, (x_max - x_min) * w, (y_max - y_min) * h)
    }
}

/// Depthwise-separable residual block.
struct BlazeBlock {
    depthwise: Conv2d,
    pointwise: Conv2d,
    channel_pad: usize,
    downsample: bool,
}

impl BlazeBlock {
    #[allow(clippy::similar_names)]
    fn new(in_channels: usize, out_channels: usize, stride: usize, vb: &VarBuilder) -> Result<Self> {
        let downsample = stride == 2;
        let depthwise = conv2d(
            in_channels,
            in_channels,
            3,
            Conv2dConfig {
                stride,
                padding: usize::from(!downsample),
                groups: in_channels,
                ..Conv2dConfig::default()
            },
            vb.pp("depthwise"),
        )?;
        let pointwise = conv2d(
            in_channels,
            out_channels,
            1,
            Conv2dConfig::default(),
            vb.pp("pointwise"),
        )?;

        Ok(Self {
            depthwise,
            pointwise,
            channel_pad: out_channels.saturating_sub(in_channels),
            downsample,
        })
    }
}

impl Module for BlazeBlock {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let (input, shortcut) = if self.downsample {
            // Pad right and bottom only, then pool the shortcut to match
            let padded = x.pad_with_zeros(2, 0, 2)?.pad_with_zeros(3, 0, 2)?;
            (padded, x.max_pool2d(2)?)
        } else {
            (x.clone(), x.clone())
        };

        let h = self.depthwise.forward(&input)?.relu()?;
        let h = self.pointwise.forward(&h)?;

        let shortcut = if self.channel_pad > 0 {
            shortcut.pad_with_zeros(1, 0, self.channel_pad)?
        } else {
            shortcut
        };

        (h + shortcut)?.relu()
    }
}

/// Classifier and regressor convolutions for one feature map.
struct Head {
    classifier: Conv2d,
    regressor: Conv2d,
    anchors: usize,
}

impl Head {
    fn new(channels: usize, per_cell: usize, anchors: usize, grid: usize, vb: &VarBuilder) -> Result<Self> {
        let classifier = conv2d(
            channels,
            per_cell,
            1,
            Conv2dConfig::default(),
            vb.pp(format!("classifier_{grid}")),
        )?;
        let regressor = conv2d(
            channels,
            per_cell * 16,
            1,
            Conv2dConfig::default(),
            vb.pp(format!("regressor_{grid}")),
        )?;
        Ok(Self {
            classifier,
            regressor,
            anchors,
        })
    }

    fn forward(&self, features: &Tensor) -> Result<(Tensor, Tensor)> {
        let scores = self
            .classifier
            .forward(features)?
            .permute((0, 2, 3, 1))?
            .reshape((1, self.anchors, 1))?;
        let boxes = self
            .regressor
            .forward(features)?
            .permute((0, 2, 3, 1))?
            .reshape((1, self.anchors, 16))?;
        Ok((scores, boxes))
    }
}

/// The `BlazeFace` network.
pub struct BlazeFace {
    stem: Conv2d,
    backbone_16: Vec<BlazeBlock>,
    backbone_8: Vec<BlazeBlock>,
    head_16: Head,
    head_8: Head,
    anchors: Vec<[f32; 2]>,
    device: Device,
}

impl BlazeFace {
    /// Builds the network from its weights.
    ///
    /// # Errors
    ///
    /// Returns an error if a weight tensor is missing or has the wrong shape.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(vb: VarBuilder) -> Result<Self> {
        let stem = conv2d(
            3,
            24,
            5,
            Conv2dConfig {
                stride: 2,
                ..Conv2dConfig::default()
            },
            vb.pp("conv0"),
        )?;

        let backbone_16 = BACKBONE_16
            .iter()
            .enumerate()
            .map(|(i, &(c_in, c_out, s))| BlazeBlock::new(c_in, c_out, s, &vb.pp(format!("backbone1.{i}"))))
            .collect::<Result<Vec<_>>>()?;
        let backbone_8 = BACKBONE_8
            .iter()
            .enumerate()
            .map(|(i, &(c_in, c_out, s))| BlazeBlock::new(c_in, c_out, s, &vb.pp(format!("backbone2.{i}"))))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            stem,
            backbone_16,
            backbone_8,
            head_16: Head::new(88, 2, ANCHORS_16, 16, &vb)?,
            head_8: Head::new(96, 6, NUM_ANCHORS - ANCHORS_16, 8, &vb)?,
            anchors: anchor_centers(),
            device: vb.device().clone(),
        })
    }

    /// Reads the network from a safetensors checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or lacks the stem or head
    /// tensors, or if a backbone tensor is missing or misshapen.
    pub fn load(path: &Path, device: &Device) -> Result<Self> {
        let vb = load_weights(path, device, &REQUIRED_TENSORS)?;
        Self::new(vb)
    }

    /// Resizes `image` to the network input and normalizes it to `[-1, 1]`.
    fn to_input(&self, image: &DynamicImage) -> Result<Tensor> {
        let side = INPUT_SIZE as u32;
        let rgb = image.resize_exact(side, side, FilterType::Triangle).to_rgb8();
        let data: Vec<f32> = rgb
            .pixels()
            .flat_map(|p| p.0.map(|c| f32::from(c) / 127.5 - 1.0))
            .collect();

        Tensor::from_vec(data, (1, INPUT_SIZE, INPUT_SIZE, 3), &self.device)?
            .permute((0, 3, 1, 2))?
            .to_dtype(DType::F32)
            .context("Failed to build detector input")
    }

    fn forward(&self, input: &Tensor) -> Result<(Tensor, Tensor)> {
        let x = input.pad_with_zeros(2, 1, 2)?.pad_with_zeros(3, 1, 2)?;
        let mut h = self.stem.forward(&x)?.relu()?;

        for block in &self.backbone_16 {
            h = block.forward(&h)?;
        }
        let (scores_16, boxes_16) = self.head_16.forward(&h)?;

        for block in &self.backbone_8 {
            h = block.forward(&h)?;
        }
        let (scores_8, boxes_8) = self.head_8.forward(&h)?;

        Ok((
            Tensor::cat(&[scores_16, scores_8], 1)?,
            Tensor::cat(&[boxes_16, boxes_8], 1)?,
        ))
    }

    /// Detects faces scoring at least `min_score`, after non-maximum suppression.
    ///
    /// # Errors
    ///
    /// Returns an error if the forward pass fails.
    pub fn detect(&self, image: &DynamicImage, min_score: f32) -> Result<Vec<FaceDetection>> {
        let input = self.to_input(image)?;
        let (scores, boxes) = self.forward(&input)?;

        let scores = scores.squeeze(0)?.to_vec2::<f32>()?;
        let boxes = boxes.squeeze(0)?.to_vec2::<f32>()?;
        let size = INPUT_SIZE as f32;

        let candidates = self
            .anchors
            .iter()
            .zip(scores.iter().zip(&boxes))
            .filter_map(|(&[ax, ay], (logit, raw))| {
                let score = sigmoid(logit[0]);
                if score < min_score {
                    return None;
                }
                let cx = ax + raw[0] / size;
                let cy = ay + raw[1] / size;
                let (half_w, half_h) = (raw[2] / size / 2.0, raw[3] / size / 2.0);
                Some(FaceDetection {
                    bbox: [cx - half_w, cy - half_h, cx + half_w, cy + half_h],
                    score,
                })
            })
            .collect();

        Ok(suppress_overlaps(candidates))
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Anchor centers for the 16x16 grid (two per cell) and the 8x8 grid (six per cell).
fn anchor_centers() -> Vec<[f32; 2]> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    for (grid, per_cell) in [(16_u8, 2), (8_u8, 6)] {
        let cells = f32::from(grid);
        for y in 0..grid {
            for x in 0..grid {
                let center = [(f32::from(x) + 0.5) / cells, (f32::from(y) + 0.5) / cells];
                anchors.extend(std::iter::repeat(center).take(per_cell));
            }
        }
    }
    anchors
}

/// Greedy non-maximum suppression, highest score first.
fn suppress_overlaps(mut detections: Vec<FaceDetection>) -> Vec<FaceDetection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut pending: VecDeque<FaceDetection> = detections.into();
    let mut kept = Vec::new();
    while let Some(best) = pending.pop_front() {
        pending.retain(|other| iou(&best.bbox, &other.bbox) < NMS_THRESHOLD);
        kept.push(best);
    }
    kept
}

/// Intersection over union of two `[x_min, y_min, x_max, y_max]` boxes.
fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let overlap_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let overlap_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = overlap_w * overlap_h;

    let union = (a[2] - a[0]) * (a[3] - a[1]) + (b[2] - b[0]) * (b[3] - b[1]) - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Hands out `BlazeFace` handles sharing one lazily loaded network.
///
/// The weights are read on the first `acquire`. A failed read is not kept, so
/// a later `acquire` tries again.
pub struct BlazeFaceProvider {
    weights: PathBuf,
    device: Device,
    model: OnceCell<BlazeFace>,
    min_confidence: f32,
}

impl BlazeFaceProvider {
    /// Creates a provider for the weights at `weights`. Nothing is loaded yet.
    #[must_use]
    pub fn new(weights: impl AsRef<Path>, min_confidence: f32) -> Self {
        Self {
            weights: weights.as_ref().to_path_buf(),
            device: get_device(),
            model: OnceCell::new(),
            min_confidence,
        }
    }

    /// Returns true once the network has been built.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }
}

impl DetectorProvider for BlazeFaceProvider {
    fn acquire(&self) -> crate::Result<Box<dyn FaceDetector + '_>> {
        let model = self
            .model
            .get_or_try_init(|| {
                info!("Loading BlazeFace from {}", self.weights.display());
                BlazeFace::load(&self.weights, &self.device)
            })
            .context("Failed to load BlazeFace")
            .map_err(|e| PipelineError::detection(&e))?;

        Ok(Box::new(BlazeFaceHandle {
            model,
            min_confidence: self.min_confidence,
        }))
    }
}

struct BlazeFaceHandle<'a> {
    model: &'a BlazeFace,
    min_confidence: f32,
}

impl FaceDetector for BlazeFaceHandle<'_> {
    fn detect(&mut self, image: &ImageInfo) -> crate::Result<Vec<FaceRegion>> {
        let detections = self
            .model
            .detect(&image.image, self.min_confidence)
            .map_err(|e| PipelineError::detection(&e))?;

        Ok(detections
            .iter()
            .map(|d| d.to_region(image.width, image.height))
            .collect())
    }

    fn release(&mut self) {
        debug!("BlazeFace handle released");
    }
}
