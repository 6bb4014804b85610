//! Labels asset: one class name per line, index-aligned with model output.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::LabelNames;

/// Parses a labels list, trimming lines and skipping blank ones.
///
/// # Errors
///
/// Returns an error if either recognized label is absent.
pub fn parse_labels(text: &str, names: &LabelNames) -> Result<Vec<String>> {
    let labels: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    for required in [&names.mask, &names.no_mask] {
        if !labels.iter().any(|l| l == required) {
            anyhow::bail!("labels list does not contain '{required}'");
        }
    }

    Ok(labels)
}

/// Reads and parses the labels file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or lacks a recognized label.
pub fn load_labels(path: impl AsRef<Path>, names: &LabelNames) -> Result<Vec<String>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read labels file: {}", path.display()))?;
    let labels =
        parse_labels(&text, names).with_context(|| format!("Invalid labels file: {}", path.display()))?;
    debug!("Loaded {} labels from {}", labels.len(), path.display());
    Ok(labels)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_keeps_order_and_skips_blanks() {
        let labels = parse_labels("  mask \n\nno_mask\r\n", &LabelNames::default()).unwrap();
        assert_eq!(labels, vec!["mask", "no_mask"]);
    }

    #[test]
    fn test_parse_allows_extra_labels() {
        let labels = parse_labels("no_mask\nmask\nbackground\n", &LabelNames::default()).unwrap();
        assert_eq!(labels, vec!["no_mask", "mask", "background"]);
    }

    #[test]
    fn test_parse_requires_both_labels() {
        let err = parse_labels("mask\nhat\n", &LabelNames::default()).unwrap_err();
        assert!(err.to_string().contains("no_mask"));
    }

    #[test]
    fn test_load_labels_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "mask\nno_mask").unwrap();
        let labels = load_labels(file.path(), &LabelNames::default()).unwrap();
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn test_load_labels_missing_file() {
        let result = load_labels("/nonexistent/labels.txt", &LabelNames::default());
        assert!(result.is_err());
    }
}
