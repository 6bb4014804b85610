//! Filesystem adapter for loading images.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mask_control_core::{ImageInfo, ImageSource, PipelineError};
use tracing::{debug, warn};

/// Supported image extensions.
const EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tiff", "tif", "webp", "bmp", "gif"];

/// Loads images from local paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsImageSource;

impl FsImageSource {
    /// Creates a new filesystem image source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ImageSource for FsImageSource {
    fn load(&self, reference: &str) -> mask_control_core::Result<ImageInfo> {
        load_image(Path::new(reference)).map_err(|e| PipelineError::decode(&e))
    }
}

/// Expands files and directories into the list of supported images.
///
/// Files are kept in argument order; directory entries are sorted by path.
/// Unsupported files and missing paths are skipped with a warning.
#[must_use]
pub fn collect_images(paths: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_supported_image(path) {
                files.push(path.clone());
            } else {
                warn!("Unsupported file type: {}", path.display());
            }
        } else if path.is_dir() {
            collect_from_dir(path, recursive, &mut files);
        } else {
            warn!("Path does not exist: {}", path.display());
        }
    }

    debug!("Found {} image file(s)", files.len());
    files
}

fn collect_from_dir(dir: &Path, recursive: bool, files: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!("Failed to read directory {}: {e}", dir.display());
            return;
        }
    };

    let mut paths: Vec<PathBuf> = entries.flatten().map(|entry| entry.path()).collect();
    paths.sort();

    for path in paths {
        if path.is_file() && is_supported_image(&path) {
            files.push(path);
        } else if path.is_dir() && recursive {
            collect_from_dir(&path, recursive, files);
        }
    }
}

/// Checks if a path has a supported image extension.
fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .is_some_and(|e| EXTENSIONS.contains(&e.as_str()))
}

/// Decodes one image file.
fn load_image(path: &Path) -> Result<ImageInfo> {
    if !is_supported_image(path) {
        anyhow::bail!("Unsupported image format: {}", path.display());
    }

    let image =
        image::open(path).with_context(|| format!("Failed to open image: {}", path.display()))?;
    let info = ImageInfo::new(path.to_string_lossy(), image);
    debug!("Loaded {} ({}x{})", info.path, info.width, info.height);
    Ok(info)
}
