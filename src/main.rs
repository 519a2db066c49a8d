//! Hourglass - unified CLI entrypoint.
//!
//! Usage:
//!   hourglass start --config config/hourglass.toml
//!   hourglass config validate --config config/hourglass.toml
//!   hourglass config generate --output config/hourglass.toml
//!   hourglass simulate --actors 1000 --keys 10 --ticks 200

use anyhow::Result;
use clap::Parser;
use hourglass::cli::commands::{init_tracing, run_config, run_simulate, run_start_with_config};
use hourglass::cli::{Cli, Commands};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine config path - use global --config or default
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config/hourglass.toml"));

    match cli.command {
        Commands::Start(args) => run_start_with_config(&config_path, args, cli.log_level).await,
        Commands::Config(args) => run_config(args),
        Commands::Simulate(args) => {
            init_tracing(cli.log_level.as_deref().unwrap_or("warn"));
            run_simulate(&config_path, args)
        }
    }
}
