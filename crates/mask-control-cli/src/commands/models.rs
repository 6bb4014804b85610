//! Models command - inspect the model assets.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use mask_control_adapters::ModelStore;
use mask_control_core::PipelineConfig;

use crate::config::AppConfig;

/// Arguments for the models command
#[derive(Args)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,

    /// Custom models directory (overrides default and config)
    #[arg(long, value_name = "DIR", global = true)]
    pub models_dir: Option<PathBuf>,
}

/// Models subcommands
#[derive(Subcommand)]
pub enum ModelsCommand {
    /// List required assets and whether they are installed
    List,
    /// Print model directory path
    Path,
}

/// Run the models command.
pub fn run(args: &ModelsArgs, config: &AppConfig) -> Result<()> {
    let dir = args.models_dir.as_deref().or(config.models.dir.as_deref());
    let store = ModelStore::resolve(dir);

    match args.command {
        ModelsCommand::List => list_models(&store, &config.pipeline_defaults()),
        ModelsCommand::Path => print_path(&store),
    }
}

#[allow(clippy::unnecessary_wraps)]
fn list_models(store: &ModelStore, config: &PipelineConfig) -> Result<()> {
    let status = store.status(config);

    println!("Models directory: {}", store.dir().display());
    println!();

    for entry in &status {
        let mark = if entry.installed { "✓" } else { "✗" };
        println!(
            "  {mark} {} ({}) - {}",
            entry.asset.name, entry.asset.filename, entry.asset.description
        );
    }

    println!();
    let installed_count = status.iter().filter(|s| s.installed).count();
    println!("{}/{} assets installed", installed_count, status.len());

    Ok(())
}

#[allow(clippy::unnecessary_wraps)]
fn print_path(store: &ModelStore) -> Result<()> {
    println!("{}", store.dir().display());
    Ok(())
}
