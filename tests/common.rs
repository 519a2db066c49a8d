//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

use hourglass::cooldown::{CooldownManager, NoopScheduler};
use hourglass::core::config::Config;
use hourglass::core::time::{EpochMillis, ManualClock, ManualTickSource, Tick};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Epoch millisecond every harness clock starts at.
pub const START_MS: u64 = 1_700_000_000_000;

/// A manager on manual clocks with no background cleanup.
pub struct Harness {
    pub manager: CooldownManager<String>,
    pub ticks: Arc<ManualTickSource>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    /// Advance both the tick source and the millisecond clock.
    pub fn advance(&self, ticks: u64, ms: u64) {
        self.ticks.advance(ticks);
        self.clock.advance_ms(ms);
    }

    /// Run a cleanup pass at the harness's current time.
    pub fn cleanup(&self) -> hourglass::cooldown::CleanupReport {
        self.manager.run_cleanup()
    }
}

/// Build a harness with default configuration.
pub fn harness() -> Harness {
    harness_with_config(Config::default())
}

/// Build a harness with the given configuration.
pub fn harness_with_config(config: Config) -> Harness {
    let ticks = Arc::new(ManualTickSource::new(Tick::zero()));
    let clock = Arc::new(ManualClock::new(EpochMillis::new(START_MS)));
    let manager = CooldownManager::builder(config)
        .with_clock(clock.clone())
        .with_tick_source(ticks.clone())
        .with_scheduler(Arc::new(NoopScheduler))
        .build();
    Harness {
        manager,
        ticks,
        clock,
    }
}

/// Actor id helper.
pub fn player(n: u32) -> String {
    format!("player{}", n)
}

/// Create a minimal valid configuration file.
pub fn create_minimal_config() -> NamedTempFile {
    write_config("[cleanup]\ninterval_ms = 1000\n")
}

/// Create a configuration with custom settings.
pub fn create_config_with_settings(interval_ms: u64, log_level: &str) -> NamedTempFile {
    write_config(&format!(
        r#"
[cleanup]
interval_ms = {}

[telemetry]
log_level = "{}"
"#,
        interval_ms, log_level
    ))
}

/// Write arbitrary TOML to a temp file.
pub fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Load a config from a temp file.
pub fn load_config(file: &NamedTempFile) -> Config {
    Config::from_file(file.path()).expect("Failed to load config")
}

/// Assert that a result is Ok and return the value.
#[track_caller]
pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a result is Err.
#[track_caller]
pub fn assert_err<T: std::fmt::Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
        Err(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_minimal_config() {
        let file = create_minimal_config();
        let config = load_config(&file);
        assert_eq!(config.cleanup.interval_ms, 1000);
    }

    #[test]
    fn test_create_config_with_settings() {
        let file = create_config_with_settings(250, "debug");
        let config = load_config(&file);
        assert_eq!(config.cleanup.interval_ms, 250);
        assert_eq!(config.telemetry.log_level, "debug");
    }

    #[test]
    fn test_harness_starts_empty() {
        let h = harness();
        assert_eq!(h.manager.metrics_snapshot().entries_tracked(), 0);
        assert!(!h.manager.has_background_cleanup());
    }

    #[test]
    fn test_harness_advance() {
        use hourglass::core::time::{MillisClock, TickSource};
        let h = harness();
        h.advance(5, 500);
        assert_eq!(h.ticks.current_tick(), Tick::new(5));
        assert_eq!(h.clock.now(), EpochMillis::new(START_MS + 500));
    }
}
