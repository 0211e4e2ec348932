#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `asie`: runs the pipeline and answers reporting queries over its
//! artifacts.
//!
//! Uses `indicatif-log-bridge` (via [`asie_cli_utils::init_logger`]) to
//! route `log` output through `indicatif::MultiProgress` so that log lines
//! and progress bars never fight for the terminal. Set `RUST_LOG=info` to
//! see stage-by-stage logging.

mod pipeline;
mod query;

use std::path::PathBuf;

use asie_panel_models::Frequency;
use asie_pipeline::{PipelineConfig, PipelineError};
use asie_query::QueryEngine;
use clap::{Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "asie", about = "Aadhaar Societal Intelligence Engine")]
struct Cli {
    /// Pipeline config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the parquet artifacts
    #[arg(long, global = true)]
    processed_root: Option<PathBuf>,
    /// Period frequency: D, W, M, Q or Y
    #[arg(long, global = true)]
    freq: Option<Frequency>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate raw files, compute indices, detect anomalies, and write
    /// every artifact plus the summary report
    Run(pipeline::RunArgs),
    /// Forecast metrics for every level with a metrics panel
    Forecast(pipeline::ForecastArgs),
    #[command(flatten)]
    Query(query::QueryCommand),
}

impl Cli {
    /// Config file (or defaults) with the global overrides applied.
    fn config(&self) -> Result<PipelineConfig, PipelineError> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(dir) = &self.processed_root {
            config.processed_root.clone_from(dir);
        }
        if let Some(freq) = self.freq {
            config.frequency = freq;
        }
        Ok(config)
    }
}

/// Prints `value` to stdout as pretty JSON.
fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => log::error!("Failed to encode output: {e}"),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = asie_cli_utils::init_logger();
    let cli = Cli::parse();
    let config = cli.config()?;

    match cli.command {
        Commands::Run(args) => pipeline::run(&multi, config, args)?,
        Commands::Forecast(args) => pipeline::forecast(config, args)?,
        Commands::Query(command) => {
            let engine = QueryEngine::new(config.processed_root, config.frequency);
            query::run(&engine, command)?;
        }
    }

    Ok(())
}
