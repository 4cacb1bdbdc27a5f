//! CLI for the dispatch layer.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dispatch_core::config::{self, DispatchConfig};
use std::path::PathBuf;

use commands::{run_config, run_simulate, SimulateArgs};

/// Top-level CLI for the dispatch layer.
#[derive(Debug, Parser)]
#[command(name = "dispatch")]
#[command(about = "Fault-tolerant dispatch: circuit breaker, retry and bounded launcher", long_about = None)]
pub struct Cli {
    /// Read settings from this file instead of ~/.config/dispatch/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Print the effective configuration and where it was loaded from.
    Config,

    /// Run a synthetic batch against a flaky simulated dependency.
    Simulate(SimulateArgs),
}

impl Cli {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let (cfg, path) = cli.load_config()?;
        tracing::debug!("loaded config from {}: {:?}", path.display(), cfg);

        match cli.command {
            CliCommand::Config => run_config(&cfg, &path)?,
            CliCommand::Simulate(args) => run_simulate(&cfg, &args).await?,
        }

        Ok(())
    }

    fn load_config(&self) -> Result<(DispatchConfig, PathBuf)> {
        match &self.config {
            Some(path) => Ok((config::load_from_path(path)?, path.clone())),
            None => Ok((config::load_or_init()?, config::config_path()?)),
        }
    }
}

#[cfg(test)]
mod tests;
