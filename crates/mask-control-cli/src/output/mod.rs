//! Output formatting for CLI.

mod json;
mod notices;

pub use json::{JsonOutput, OutputFormat, ReportRecord};
pub use notices::NoticePrinter;
