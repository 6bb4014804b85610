//! Per-face notices on stderr.

use mask_control_core::{ProgressEvent, ProgressSink};

/// Prints one short notice per classified face.
///
/// Notices are `opened` for a face with a mask and `closed` for a face
/// without one, prefixed with the image path and face index.
pub struct NoticePrinter {
    path: String,
    quiet: bool,
}

impl NoticePrinter {
    /// Creates a printer for the notices of one image.
    #[must_use]
    pub fn new(path: impl Into<String>, quiet: bool) -> Self {
        Self {
            path: path.into(),
            quiet,
        }
    }

    /// Formats the notice line for an event, if the event produces one.
    fn line(&self, event: &ProgressEvent) -> Option<String> {
        match event {
            ProgressEvent::FaceClassified { index, verdict } => Some(format!(
                "{} [face {index}]: {}",
                self.path,
                verdict.notice()
            )),
            ProgressEvent::FaceSkipped { index, region } => Some(format!(
                "WARN: Skipping face {index} in {}: empty region {region}",
                self.path
            )),
            ProgressEvent::Stage(_) | ProgressEvent::PreviewReady { .. } => None,
        }
    }
}

impl ProgressSink for NoticePrinter {
    fn on_event(&self, event: ProgressEvent) {
        if self.quiet {
            return;
        }
        if let Some(line) = self.line(&event) {
            eprintln!("{line}");
        }
    }
}
