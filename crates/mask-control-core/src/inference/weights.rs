//! Safetensors checkpoints for the candle detector.

use std::path::Path;

use anyhow::{Context, Result};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use tracing::debug;

/// Reads a safetensors checkpoint onto `device` and checks it holds every
/// tensor in `required`.
///
/// Weights stored in another float type are converted to `f32` when the
/// model fetches them.
///
/// # Errors
///
/// Returns an error if the file is missing or malformed, or if any required
/// tensor is absent. All absent names are listed in the message.
pub fn load_weights(path: &Path, device: &Device, required: &[&str]) -> Result<VarBuilder<'static>> {
    if !path.is_file() {
        anyhow::bail!("Weights file not found: {}", path.display());
    }

    let tensors = candle_core::safetensors::load(path, device)
        .with_context(|| format!("Failed to read weights: {}", path.display()))?;

    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| !tensors.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        anyhow::bail!(
            "{} is not a compatible checkpoint, missing: {}",
            path.display(),
            missing.join(", ")
        );
    }

    debug!("Read {} tensors from {}", tensors.len(), path.display());
    Ok(VarBuilder::from_tensors(tensors, DType::F32, device))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use candle_core::Tensor;
    use tempfile::TempDir;

    use super::*;

    fn checkpoint(dir: &TempDir, names: &[&str]) -> std::path::PathBuf {
        let tensors: HashMap<String, Tensor> = names
            .iter()
            .map(|&name| {
                let tensor = Tensor::new(&[[1.0_f32, 2.0], [3.0, 4.0]], &Device::Cpu).unwrap();
                (name.to_string(), tensor)
            })
            .collect();
        let path = dir.path().join("detector.safetensors");
        candle_core::safetensors::save(&tensors, &path).expect("save checkpoint");
        path
    }

    #[test]
    fn test_load_weights_with_required_tensors() {
        let dir = TempDir::new().unwrap();
        let path = checkpoint(&dir, &["conv0.weight", "conv0.bias"]);

        let vb = load_weights(&path, &Device::Cpu, &["conv0.weight"]).expect("load");
        assert!(vb.contains_tensor("conv0.bias"));
        let weight = vb.get((2, 2), "conv0.weight").unwrap();
        assert_eq!(weight.dtype(), DType::F32);
    }

    #[test]
    fn test_missing_tensors_are_listed() {
        let dir = TempDir::new().unwrap();
        let path = checkpoint(&dir, &["conv0.weight"]);

        let err = load_weights(
            &path,
            &Device::Cpu,
            &["conv0.weight", "classifier_8.weight", "regressor_8.weight"],
        )
        .err()
        .expect("incomplete checkpoint");
        let message = format!("{err:#}");
        assert!(message.contains("classifier_8.weight, regressor_8.weight"), "{message}");
        assert!(!message.contains("conv0.weight"), "{message}");
    }

    #[test]
    fn test_missing_file() {
        let err = load_weights(Path::new("/nonexistent/blazeface.safetensors"), &Device::Cpu, &[])
            .err()
            .expect("missing file");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.safetensors");
        std::fs::write(&path, b"not a checkpoint").unwrap();
        assert!(load_weights(&path, &Device::Cpu, &[]).is_err());
    }
}
