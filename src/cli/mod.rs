//! Command-line interface.

pub mod commands;

use clap::{Parser, Subcommand};

/// Hourglass - per-actor cooldown engine.
#[derive(Parser, Debug)]
#[command(name = "hourglass")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the cooldown engine until interrupted.
    Start(commands::StartArgs),
    /// Configuration operations.
    Config(commands::ConfigArgs),
    /// Drive synthetic load through a manager and print its metrics.
    Simulate(commands::SimulateArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simulate() {
        let cli = Cli::try_parse_from([
            "hourglass",
            "simulate",
            "--actors",
            "4",
            "--keys",
            "2",
            "--ticks",
            "50",
        ])
        .unwrap();
        match cli.command {
            Commands::Simulate(args) => {
                assert_eq!(args.actors, 4);
                assert_eq!(args.keys, 2);
                assert_eq!(args.ticks, 50);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["hourglass", "start", "--config", "hg.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("hg.toml"));
    }
}
