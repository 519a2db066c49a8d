//! Core infrastructure tests.

mod common;

use hourglass::core::config::{Config, ConfigOverrides};
use hourglass::core::error::CooldownError;
use hourglass::core::time::{
    EpochMillis, ManualClock, ManualTickSource, MillisClock, Tick, TickSource, TickSourceType,
    WallClockTickSource,
};
use std::time::Duration;

// ============================================================================
// Config tests
// ============================================================================

#[test]
fn parse_minimal_config() {
    let file = common::create_minimal_config();
    let config = common::load_config(&file);
    assert_eq!(config.cleanup.interval_ms, 1000);
    assert_eq!(config.cleanup.ms_per_tick, 50);
    assert_eq!(config.overrides.fingerprint_cache_max, 1000);
}

#[test]
fn parse_full_config() {
    let file = common::write_config(
        r#"
[cleanup]
interval_ms = 30000
ms_per_tick = 25

[overrides]
fingerprint_cache_max = 64
override_set_max = 128

[cooldowns]
default_spell_ticks = 40
default_command_seconds = 3

[cooldowns.spells]
Fireball = 120

[cooldowns.commands]
Heal = 15

[telemetry]
log_level = "warn"
"#,
    );
    let config = common::load_config(&file);

    assert_eq!(config.cleanup.interval(), Duration::from_secs(30));
    assert_eq!(config.cleanup.ms_per_tick, 25);
    assert_eq!(config.overrides.override_set_max, 128);
    assert_eq!(config.cooldowns.spell_ticks("Fireball"), 120);
    assert_eq!(config.cooldowns.spell_ticks("fireball"), 40);
    assert_eq!(config.cooldowns.command_seconds("heal"), 15);
    assert_eq!(config.cooldowns.command_seconds("spawn"), 3);
    assert_eq!(config.telemetry.log_level, "warn");
}

#[test]
fn validate_invalid_log_level() {
    let file = common::create_config_with_settings(1000, "verbose");
    let result = Config::from_file(file.path());
    assert!(result.is_err());
    assert!(format!("{:#}", result.unwrap_err()).contains("log_level"));
}

#[test]
fn validate_zero_caps() {
    let file = common::write_config("[overrides]\nfingerprint_cache_max = 0\n");
    assert!(Config::from_file(file.path()).is_err());

    let file = common::write_config("[cleanup]\nms_per_tick = 0\n");
    assert!(Config::from_file(file.path()).is_err());
}

#[test]
fn reject_negative_lengths() {
    let file = common::write_config("[cooldowns]\ndefault_spell_ticks = -1\n");
    assert!(Config::from_file(file.path()).is_err());
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_file_or_default(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.cleanup.interval_ms, 60_000);
    assert!(Config::from_file(&dir.path().join("absent.toml")).is_err());
}

#[test]
fn cli_overrides_apply() {
    let mut config = Config::default();
    config.apply_overrides(&ConfigOverrides {
        log_level: Some("trace".into()),
        cleanup_interval_ms: None,
    });
    assert_eq!(config.telemetry.log_level, "trace");
    assert_eq!(config.cleanup.interval_ms, 60_000);
    assert!(config.validate().is_ok());
}

// ============================================================================
// Time tests
// ============================================================================

#[test]
fn tick_arithmetic() {
    assert_eq!(Tick::from_signed(-3), None);
    assert_eq!(Tick::clamped(-3), Tick::zero());
    assert_eq!(Tick::new(10).ticks_until(Tick::new(25)), 15);
    assert_eq!(Tick::new(30).ticks_until(Tick::new(25)), 0);
    assert_eq!(Tick::new(u64::MAX).add(1), Tick::new(u64::MAX));
}

#[test]
fn epoch_millis_floor_seconds() {
    let now = EpochMillis::new(1_000);
    assert_eq!(now.whole_secs_until(EpochMillis::new(10_999)), 9);
    assert_eq!(now.whole_secs_until(EpochMillis::new(11_000)), 10);
    assert_eq!(now.whole_secs_until(EpochMillis::new(500)), 0);
}

#[test]
fn manual_sources_are_deterministic() {
    let ticks = ManualTickSource::new(Tick::new(7));
    ticks.advance(3);
    assert_eq!(ticks.current_tick(), Tick::new(10));
    assert_eq!(ticks.source_type(), TickSourceType::Manual);

    let clock = ManualClock::new(EpochMillis::new(0));
    clock.advance_secs(2);
    clock.advance_ms(5);
    assert_eq!(clock.now(), EpochMillis::new(2_005));
}

#[test]
fn wall_clock_tick_source_advances() {
    let ticks = WallClockTickSource::new(50);
    assert_eq!(ticks.source_type(), TickSourceType::WallClock);
    assert!(ticks.current_tick() > Tick::zero());
}

// ============================================================================
// Error tests
// ============================================================================

#[test]
fn on_cooldown_error_is_user_facing() {
    let err = CooldownError::on_cooldown("heal", 1);
    assert!(err.is_user_facing());
    assert_eq!(err.code(), "COMMAND_COOLDOWN");
    assert_eq!(
        err.to_string(),
        "This command is on cooldown. Please wait 1 second."
    );
}

#[test]
fn background_errors_are_not_user_facing() {
    let err = CooldownError::CallbackPanicked { domain: "spell" };
    assert!(!err.is_user_facing());
    assert_eq!(err.code(), "CALLBACK_PANICKED");
    assert!(err.to_string().contains("spell"));
}
