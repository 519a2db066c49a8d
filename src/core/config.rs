//! Configuration parsing and validation.
//!
//! Configuration is loaded from TOML with CLI overrides. Every field has a
//! hard-coded default, so an empty file (or no file) yields a working engine.

use crate::core::time::TickSourceType;
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Background cleanup configuration.
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Override registry limits.
    #[serde(default)]
    pub overrides: OverridesConfig,

    /// Default cooldown lengths.
    #[serde(default)]
    pub cooldowns: CooldownsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Background cleanup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Interval between cleanup passes in milliseconds.
    #[serde(default = "default_cleanup_interval_ms")]
    pub interval_ms: u64,

    /// Where the cleanup pass reads the spell-domain "now" from:
    /// `observed` (highest caller tick) or `wall_clock`.
    #[serde(default)]
    pub tick_source: TickSourceType,

    /// Tick length used by the wall-clock tick source.
    #[serde(default = "default_ms_per_tick")]
    pub ms_per_tick: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_cleanup_interval_ms(),
            tick_source: TickSourceType::default(),
            ms_per_tick: default_ms_per_tick(),
        }
    }
}

impl CleanupConfig {
    /// Cleanup interval as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Override registry limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverridesConfig {
    /// Maximum fingerprint cache entries before a bulk clear.
    #[serde(default = "default_fingerprint_cache_max")]
    pub fingerprint_cache_max: usize,

    /// Maximum override entries before a bulk clear.
    #[serde(default = "default_override_set_max")]
    pub override_set_max: usize,
}

impl Default for OverridesConfig {
    fn default() -> Self {
        Self {
            fingerprint_cache_max: default_fingerprint_cache_max(),
            override_set_max: default_override_set_max(),
        }
    }
}

/// Default cooldown lengths per action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownsConfig {
    /// Spell cooldown in ticks when no per-spell entry exists.
    #[serde(default = "default_spell_ticks")]
    pub default_spell_ticks: u64,

    /// Command cooldown in seconds when no per-command entry exists. 0 disables.
    #[serde(default)]
    pub default_command_seconds: u64,

    /// Per-spell lengths in ticks. Keys are case-sensitive.
    #[serde(default)]
    pub spells: HashMap<String, u64>,

    /// Per-command lengths in seconds. Keys are case-insensitive and are
    /// stored lowercased.
    #[serde(default, deserialize_with = "lowercase_keys")]
    pub commands: HashMap<String, u64>,
}

impl Default for CooldownsConfig {
    fn default() -> Self {
        Self {
            default_spell_ticks: default_spell_ticks(),
            default_command_seconds: 0,
            spells: HashMap::new(),
            commands: HashMap::new(),
        }
    }
}

impl CooldownsConfig {
    /// Cooldown length for a spell.
    pub fn spell_ticks(&self, spell: &str) -> u64 {
        self.spells
            .get(spell)
            .copied()
            .unwrap_or(self.default_spell_ticks)
    }

    /// Cooldown length for a command.
    pub fn command_seconds(&self, command: &str) -> u64 {
        self.commands
            .get(&command.to_lowercase())
            .copied()
            .unwrap_or(self.default_command_seconds)
    }

    /// Lowercase command keys inserted programmatically.
    ///
    /// Deserialized configs are already normalized.
    pub fn normalize(&mut self) {
        if self.commands.keys().any(|name| name.chars().any(char::is_uppercase)) {
            self.commands = std::mem::take(&mut self.commands)
                .into_iter()
                .map(|(name, secs)| (name.to_lowercase(), secs))
                .collect();
        }
    }
}

fn lowercase_keys<'de, D>(deserializer: D) -> std::result::Result<HashMap<String, u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = HashMap::<String, u64>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(name, secs)| (name.to_lowercase(), secs))
        .collect())
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn default_cleanup_interval_ms() -> u64 {
    60_000
}

fn default_ms_per_tick() -> u64 {
    50
}

fn default_fingerprint_cache_max() -> usize {
    1_000
}

fn default_override_set_max() -> usize {
    1_000
}

fn default_spell_ticks() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("invalid config: {}", path.display()))
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn from_file_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "config file absent, using defaults");
            Ok(Self::default())
        }
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(interval_ms) = overrides.cleanup_interval_ms {
            self.cleanup.interval_ms = interval_ms;
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_cleanup()?;
        self.validate_overrides()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_cleanup(&self) -> Result<()> {
        if self.cleanup.interval_ms == 0 {
            anyhow::bail!("cleanup.interval_ms must be > 0");
        }
        if self.cleanup.ms_per_tick == 0 {
            anyhow::bail!("cleanup.ms_per_tick must be > 0");
        }
        if self.cleanup.tick_source == TickSourceType::Manual {
            anyhow::bail!("cleanup.tick_source must be \"observed\" or \"wall_clock\"");
        }
        Ok(())
    }

    fn validate_overrides(&self) -> Result<()> {
        if self.overrides.fingerprint_cache_max == 0 {
            anyhow::bail!("overrides.fingerprint_cache_max must be > 0");
        }
        if self.overrides.override_set_max == 0 {
            anyhow::bail!("overrides.override_set_max must be > 0");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override cleanup interval.
    pub cleanup_interval_ms: Option<u64>,
}
