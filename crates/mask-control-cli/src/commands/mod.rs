//! CLI command definitions and handlers.

pub mod annotate;
pub mod models;

use clap::{Parser, Subcommand};

/// Mask Control - annotate faces with mask / no-mask verdicts
#[derive(Parser)]
#[command(name = "mask-control")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Shared annotate arguments (paths, rendering, output).
    #[command(flatten)]
    pub annotate: annotate::AnnotateArgs,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Detect faces and annotate each with its mask verdict
    Annotate(annotate::AnnotateArgs),
    /// Inspect the model assets
    Models(models::ModelsArgs),
}

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Every classified face wears a mask, or no face was found.
    Success = 0,
    /// At least one face without a mask.
    NoMask = 1,
    /// The command failed.
    Error = 2,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        Self::from(code as u8)
    }
}
