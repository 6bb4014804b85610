//! Mask Control Adapters - filesystem side of the pipeline.
//!
//! This crate provides adapters for:
//! - Loading user-selected images from disk
//! - Locating the detector, classifier and labels assets

pub mod fs;
pub mod models;

pub use fs::{collect_images, FsImageSource};
pub use models::{default_models_dir, required_assets, AssetStatus, ModelAsset, ModelStore};
