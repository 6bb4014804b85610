//! JSON output adapter.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use clap::ValueEnum;
use mask_control_core::{PipelineReport, ResultOutput};
use serde::Serialize;
use tracing::debug;

/// Output format for reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// JSON Lines (one JSON object per line)
    #[default]
    Jsonl,
    /// Single JSON array
    Json,
}

/// One line of CLI output: the pipeline report plus summary counts.
#[derive(Debug, Serialize)]
pub struct ReportRecord<'a> {
    /// The pipeline report, flattened into the record.
    #[serde(flatten)]
    pub report: &'a PipelineReport,
    /// Faces classified as wearing a mask.
    pub mask_count: usize,
    /// Faces classified as not wearing a mask.
    pub no_mask_count: usize,
    /// Faces skipped because of an empty crop.
    pub skipped_count: usize,
    /// When the record was produced (RFC 3339, UTC).
    pub timestamp: String,
}

impl<'a> ReportRecord<'a> {
    /// Builds a record stamped with the current time.
    #[must_use]
    pub fn new(report: &'a PipelineReport) -> Self {
        Self {
            report,
            mask_count: report.mask_count(),
            no_mask_count: report.no_mask_count(),
            skipped_count: report.skipped_count(),
            timestamp: iso_timestamp(),
        }
    }
}

/// JSON / JSON Lines output adapter.
///
/// In JSONL mode every report is written as soon as it arrives. In JSON mode
/// reports are buffered and written as one array on [`ResultOutput::flush`].
pub struct JsonOutput {
    writer: Mutex<Box<dyn Write + Send>>,
    format: OutputFormat,
    pretty: bool,
    pending: Mutex<Vec<serde_json::Value>>,
}

impl JsonOutput {
    /// Creates a new JSON output writing to stdout.
    #[must_use]
    pub fn stdout(format: OutputFormat, pretty: bool) -> Self {
        Self::new(Box::new(io::stdout()), format, pretty)
    }

    /// Creates a new JSON output writing to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer: Mutex::new(writer),
            format,
            pretty,
            pending: Mutex::new(Vec::new()),
        }
    }

    #[allow(clippy::significant_drop_tightening)]
    fn write_line(&self, json: &str) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{json}")?;
        Ok(())
    }
}

impl ResultOutput for JsonOutput {
    fn write(&self, report: &PipelineReport) -> Result<()> {
        let record = ReportRecord::new(report);
        match self.format {
            OutputFormat::Jsonl => self.write_line(&serde_json::to_string(&record)?),
            OutputFormat::Json => {
                let value = serde_json::to_value(&record)?;
                self.pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(value);
                Ok(())
            }
        }
    }

    fn flush(&self) -> Result<()> {
        if self.format == OutputFormat::Json {
            let records = std::mem::take(
                &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
            );
            debug!("Writing {} report(s) as a JSON array", records.len());
            let json = if self.pretty {
                serde_json::to_string_pretty(&records)?
            } else {
                serde_json::to_string(&records)?
            };
            self.write_line(&json)?;
        }

        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()?;
        Ok(())
    }
}

/// Generate ISO 8601 UTC timestamp (RFC 3339 format).
fn iso_timestamp() -> String {
    match time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339) {
        Ok(ts) => ts,
        Err(e) => {
            debug!("Timestamp format failed: {e}");
            String::from("1970-01-01T00:00:00Z")
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use mask_control_core::{
        FaceOutcome, FaceRegion, FaceStatus, ImageDimensions, LabelScores, Verdict,
    };

    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn report(path: &str, verdict: Verdict) -> PipelineReport {
        PipelineReport {
            path: path.to_string(),
            source: ImageDimensions::new(1000, 800),
            rendered: ImageDimensions::new(500, 400),
            scale: 0.5,
            faces: vec![FaceOutcome {
                index: 0,
                region: FaceRegion::new(100.0, 100.0, 200.0, 200.0),
                status: FaceStatus::Classified {
                    scores: LabelScores::from([("mask", 0.92), ("no_mask", 0.08)]),
                    verdict,
                    caption: "mask: 92.0%".to_string(),
                },
            }],
        }
    }

    #[test]
    fn test_jsonl_writes_one_object_per_report() {
        let buffer = SharedBuffer::default();
        let output = JsonOutput::new(Box::new(buffer.clone()), OutputFormat::Jsonl, false);

        output.write(&report("a.jpg", Verdict::Mask { score: 0.92 })).unwrap();
        output.write(&report("b.jpg", Verdict::NoMask { score: 0.7 })).unwrap();
        output.flush().unwrap();

        let text = buffer.contents();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["path"], "a.jpg");
        assert_eq!(first["mask_count"], 1);
        assert_eq!(first["no_mask_count"], 0);
        assert_eq!(first["faces"][0]["status"], "classified");
        assert!(first["timestamp"].as_str().unwrap().contains('T'));

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["no_mask_count"], 1);
    }

    #[test]
    fn test_json_buffers_until_flush() {
        let buffer = SharedBuffer::default();
        let output = JsonOutput::new(Box::new(buffer.clone()), OutputFormat::Json, true);

        output.write(&report("a.jpg", Verdict::Mask { score: 0.92 })).unwrap();
        assert!(buffer.contents().is_empty());

        output.flush().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&buffer.contents()).unwrap();
        let records = parsed.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["rendered"]["width"], 500);
        assert!(buffer.contents().contains("\n  "));
    }

    #[test]
    fn test_json_flush_without_reports_is_empty_array() {
        let buffer = SharedBuffer::default();
        let output = JsonOutput::new(Box::new(buffer.clone()), OutputFormat::Json, false);

        output.flush().unwrap();
        assert_eq!(buffer.contents().trim(), "[]");
    }
}
