//! The four pipeline stages.
//!
//! Each stage is a plain function or small struct with no state carried
//! across images; [`crate::Pipeline`] composes them in order.

mod annotator;
mod classifier;
mod font;
mod loader;
mod locator;

pub use annotator::{load_font, Annotation, Annotator};
pub use classifier::{classify_region, crop_face, preprocess};
pub use loader::{make_preview, DisplayScale};
pub use locator::DetectorLease;
