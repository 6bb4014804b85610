//! Per-face classifier scores and the mask / no-mask decision.

use std::collections::BTreeMap;

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::config::LabelNames;

/// Confidence per label name, as produced by one classifier pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelScores(BTreeMap<String, f32>);

impl LabelScores {
    /// Pairs an ordered label list with the raw output vector, index by index.
    ///
    /// Extra labels or extra scores are ignored. A label listed twice keeps its
    /// last score.
    #[must_use]
    pub fn from_output(labels: &[String], scores: &[f32]) -> Self {
        Self(
            labels
                .iter()
                .zip(scores)
                .map(|(label, score)| (label.clone(), *score))
                .collect(),
        )
    }

    /// Returns the score of `label`, or 0.0 if the model did not emit it.
    #[must_use]
    pub fn get(&self, label: &str) -> f32 {
        self.0.get(label).copied().unwrap_or(0.0)
    }

    /// Number of labels with a score.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no label has a score.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Winner-take-all decision between the two recognized labels.
    ///
    /// `mask` wins only with a strictly greater score, so ties go to `no_mask`.
    #[must_use]
    pub fn verdict(&self, labels: &LabelNames) -> Verdict {
        let mask = self.get(&labels.mask);
        let no_mask = self.get(&labels.no_mask);

        if mask > no_mask {
            Verdict::Mask { score: mask }
        } else {
            Verdict::NoMask { score: no_mask }
        }
    }
}

impl<const N: usize> From<[(&str, f32); N]> for LabelScores {
    fn from(pairs: [(&str, f32); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(label, score)| (label.to_string(), score))
                .collect(),
        )
    }
}

/// Outcome of the mask / no-mask decision for one face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "label", rename_all = "snake_case")]
pub enum Verdict {
    /// The face wears a mask.
    Mask {
        /// Winning confidence.
        score: f32,
    },
    /// The face does not wear a mask (also the tie outcome).
    NoMask {
        /// Winning confidence.
        score: f32,
    },
}

/// Stroke and text color for masked faces.
pub const MASK_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);

/// Stroke and text color for unmasked faces.
pub const NO_MASK_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

impl Verdict {
    /// Winning confidence.
    #[must_use]
    pub const fn score(&self) -> f32 {
        match self {
            Self::Mask { score } | Self::NoMask { score } => *score,
        }
    }

    /// Returns true for a masked face.
    #[must_use]
    pub const fn is_mask(&self) -> bool {
        matches!(self, Self::Mask { .. })
    }

    /// The configured label name of the winner.
    #[must_use]
    pub fn label<'a>(&self, labels: &'a LabelNames) -> &'a str {
        match self {
            Self::Mask { .. } => &labels.mask,
            Self::NoMask { .. } => &labels.no_mask,
        }
    }

    /// Annotation color: green for mask, red for no mask.
    #[must_use]
    pub const fn color(&self) -> Rgba<u8> {
        match self {
            Self::Mask { .. } => MASK_COLOR,
            Self::NoMask { .. } => NO_MASK_COLOR,
        }
    }

    /// Short user-facing notice for this face.
    #[must_use]
    pub const fn notice(&self) -> &'static str {
        match self {
            Self::Mask { .. } => "opened",
            Self::NoMask { .. } => "closed",
        }
    }

    /// Annotation text, e.g. `mask: 87.3%`.
    #[must_use]
    pub fn caption(&self, labels: &LabelNames) -> String {
        format!("{}: {}%", self.label(labels), format_percent(self.score()))
    }
}

/// Formats a `[0, 1]` confidence as a percentage with one decimal place.
///
/// Halves round up, so `0.5625` becomes `56.3`.
#[must_use]
pub fn format_percent(score: f32) -> String {
    let tenths = (f64::from(score) * 1000.0).round();
    format!("{:.1}", tenths / 10.0)
}
