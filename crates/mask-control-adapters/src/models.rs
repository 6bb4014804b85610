//! Location and installed status of the model assets.

use std::path::{Path, PathBuf};

use mask_control_core::PipelineConfig;
use tracing::debug;

/// One file the pipeline needs from the models directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAsset {
    /// Short identifier.
    pub name: &'static str,
    /// File name inside the models directory.
    pub filename: String,
    /// What the file is used for.
    pub description: &'static str,
}

/// The assets required by `config`, in pipeline order.
#[must_use]
pub fn required_assets(config: &PipelineConfig) -> Vec<ModelAsset> {
    vec![
        ModelAsset {
            name: "detector",
            filename: config.detector_file.clone(),
            description: "BlazeFace face detector weights",
        },
        ModelAsset {
            name: "classifier",
            filename: config.model_file.clone(),
            description: "Mask classifier (ONNX)",
        },
        ModelAsset {
            name: "labels",
            filename: config.labels_file.clone(),
            description: "Classifier labels, one per line",
        },
    ]
}

/// Returns the default models directory.
///
/// Uses `XDG_DATA_HOME/mask-control/models` or the platform equivalent.
#[must_use]
pub fn default_models_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mask-control")
        .join("models")
}

/// An asset together with where it should be and whether it is there.
#[derive(Debug, Clone)]
pub struct AssetStatus {
    /// The asset.
    pub asset: ModelAsset,
    /// Expected location.
    pub path: PathBuf,
    /// Whether the file exists.
    pub installed: bool,
}

/// A models directory.
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl Default for ModelStore {
    fn default() -> Self {
        Self::new(default_models_dir())
    }
}

impl ModelStore {
    /// Uses `dir` as the models directory.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Uses `dir` if given, the default location otherwise.
    #[must_use]
    pub fn resolve(dir: Option<&Path>) -> Self {
        dir.map_or_else(Self::default, Self::new)
    }

    /// The models directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `asset` inside this store.
    #[must_use]
    pub fn asset_path(&self, asset: &ModelAsset) -> PathBuf {
        self.dir.join(&asset.filename)
    }

    /// Installed status of every asset `config` needs.
    #[must_use]
    pub fn status(&self, config: &PipelineConfig) -> Vec<AssetStatus> {
        required_assets(config)
            .into_iter()
            .map(|asset| {
                let path = self.asset_path(&asset);
                let installed = path.is_file();
                debug!("Asset {} at {}: installed={installed}", asset.name, path.display());
                AssetStatus {
                    asset,
                    path,
                    installed,
                }
            })
            .collect()
    }

    /// Assets `config` needs that are not present.
    #[must_use]
    pub fn missing(&self, config: &PipelineConfig) -> Vec<AssetStatus> {
        self.status(config)
            .into_iter()
            .filter(|s| !s.installed)
            .collect()
    }

    /// Returns true if every asset `config` needs is present.
    #[must_use]
    pub fn all_installed(&self, config: &PipelineConfig) -> bool {
        self.missing(config).is_empty()
    }
}
