//! Config command implementation.

use crate::core::config::Config;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate configuration file.
    Validate {
        /// Config file path.
        #[arg(short, long, default_value = "config/hourglass.toml")]
        config: PathBuf,
    },
    /// Print configuration with defaults applied.
    Show {
        /// Config file path.
        #[arg(short, long, default_value = "config/hourglass.toml")]
        config: PathBuf,
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Generate a configuration template.
    Generate {
        /// Output file path.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Run the config command.
pub fn run_config(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Validate { config } => validate_config(&config),
        ConfigCommand::Show { config, format } => {
            println!("{}", render_config(&config, &format)?);
            Ok(())
        }
        ConfigCommand::Generate { output } => generate_config(output.as_deref()),
    }
}

fn validate_config(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {:?}", path);
    }

    let config = Config::from_file(path)?;
    println!("✓ Config file is valid");

    if config.cooldowns.spells.is_empty() && config.cooldowns.commands.is_empty() {
        println!("  ⚠ Warning: no per-action cooldowns configured, defaults apply to everything");
    }
    if config.cooldowns.default_command_seconds == 0 {
        println!("  ⚠ Warning: cooldowns.default_command_seconds is 0 (commands without an entry never cool down)");
    }

    println!("✓ Configuration validation complete");
    Ok(())
}

/// Render the effective configuration at `path` as toml or json.
fn render_config(path: &Path, format: &str) -> Result<String> {
    let config = Config::from_file(path)?;
    match format {
        "json" => serde_json::to_string_pretty(&config).context("failed to render json"),
        _ => toml::to_string_pretty(&config).context("failed to render toml"),
    }
}

fn generate_config(output: Option<&Path>) -> Result<()> {
    let template = config_template();
    match output {
        Some(path) => {
            std::fs::write(path, template)
                .with_context(|| format!("failed to write {:?}", path))?;
            println!("Generated config template: {:?}", path);
        }
        None => {
            println!("{}", template);
        }
    }
    Ok(())
}

fn config_template() -> &'static str {
    r#"# Hourglass Configuration

[cleanup]
# Interval between background cleanup passes.
interval_ms = 60000
# "observed": spell cleanup runs at the highest tick callers have passed in.
# "wall_clock": epoch-ms / ms_per_tick; only if the host's ticks are aligned.
tick_source = "observed"
# Tick length for the wall-clock tick source.
ms_per_tick = 50

[overrides]
fingerprint_cache_max = 1000
override_set_max = 1000

[cooldowns]
# Spell lengths are in ticks, command lengths in seconds.
default_spell_ticks = 100
default_command_seconds = 0

[cooldowns.spells]
fireball = 100

[cooldowns.commands]
heal = 10

[telemetry]
log_level = "info"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_template_parses_and_validates() {
        let config = Config::from_toml(config_template()).unwrap();
        assert_eq!(config.cooldowns.spell_ticks("fireball"), 100);
        assert_eq!(config.cooldowns.command_seconds("HEAL"), 10);
    }

    #[test]
    fn test_render_json_includes_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[cleanup]\ninterval_ms = 500").unwrap();

        let rendered = render_config(file.path(), "json").unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["cleanup"]["interval_ms"], 500);
        assert_eq!(value["cleanup"]["ms_per_tick"], 50);
        assert_eq!(value["telemetry"]["log_level"], "info");
    }

    #[test]
    fn test_validate_missing_file() {
        assert!(validate_config(Path::new("/nonexistent/hourglass.toml")).is_err());
    }

    #[test]
    fn test_generate_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hourglass.toml");
        generate_config(Some(&path)).unwrap();
        assert!(Config::from_file(&path).is_ok());
    }
}
