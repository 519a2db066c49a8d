//! Simulate command implementation.
//!
//! Drives synthetic spell and command load through a manager on manual
//! clocks, advances past every expiry, runs one cleanup pass and reports the
//! before/after metrics. A healthy engine ends with zero live entries.

use crate::cooldown::{Caller, CooldownManager, NoopScheduler};
use crate::core::config::Config;
use crate::core::time::{EpochMillis, ManualClock, ManualTickSource, Tick};
use crate::ops::observability::MetricsSnapshot;
use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Drive synthetic load through a manager and print its metrics.
#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Number of actors.
    #[arg(long, default_value_t = 100)]
    pub actors: u64,
    /// Spell and command keys per actor.
    #[arg(long, default_value_t = 10)]
    pub keys: u64,
    /// Longest spell cooldown in ticks. Expiries spread over 1..=ticks.
    #[arg(long, default_value_t = 200)]
    pub ticks: u64,
    /// Longest command cooldown in seconds. Lengths spread over 1..=seconds.
    #[arg(long, default_value_t = 10)]
    pub command_seconds: u64,
    /// Also print metrics in Prometheus text format.
    #[arg(long)]
    pub prometheus: bool,
}

/// Result of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    /// Actors driven.
    pub actors: u64,
    /// Keys per actor.
    pub keys: u64,
    /// Metrics after load, before cleanup.
    pub before_cleanup: MetricsSnapshot,
    /// Metrics after the cleanup pass.
    pub after_cleanup: MetricsSnapshot,
    /// Removal callbacks run by the pass.
    pub callbacks_run: usize,
    /// Cleanup pass duration in microseconds.
    pub cleanup_duration_us: u64,
}

/// Run a simulation and return its summary.
pub fn simulate(config: Config, args: &SimulateArgs) -> SimulationSummary {
    let ticks = Arc::new(ManualTickSource::new(Tick::zero()));
    let clock = Arc::new(ManualClock::new(EpochMillis::new(0)));
    let manager: CooldownManager<u64> = CooldownManager::builder(config)
        .with_clock(clock.clone())
        .with_tick_source(ticks.clone())
        .with_scheduler(Arc::new(NoopScheduler))
        .build();

    let max_ticks = args.ticks.max(1);
    let max_secs = args.command_seconds.max(1);
    for actor in 0..args.actors {
        let caller = Caller::Actor(actor);
        for key in 0..args.keys {
            let spread = actor.wrapping_mul(args.keys).wrapping_add(key);
            let until = 1 + spread % max_ticks;
            manager.set_cooldown(&actor, &format!("spell-{}", key), until as i64);

            let secs = 1 + spread % max_secs;
            // A fresh manager never rejects the first check of a key.
            let _ = manager.check_command_cooldown(&caller, &format!("cmd-{}", key), secs as i64);
        }
    }
    for key in 0..args.keys {
        let _ = manager.check_command_cooldown(&Caller::Console, &format!("cmd-{}", key), 1);
    }

    let before_cleanup = manager.metrics_snapshot();

    ticks.set(Tick::new(max_ticks));
    clock.advance_secs(max_secs);
    let report = manager.run_cleanup();
    let after_cleanup = manager.metrics_snapshot();
    manager.shutdown();

    SimulationSummary {
        actors: args.actors,
        keys: args.keys,
        before_cleanup,
        after_cleanup,
        callbacks_run: report.callbacks_run(),
        cleanup_duration_us: report.duration.as_micros() as u64,
    }
}

/// Run the simulate command.
pub fn run_simulate(config_path: &Path, args: SimulateArgs) -> Result<()> {
    let config = Config::from_file_or_default(config_path)
        .with_context(|| format!("failed to load config from {:?}", config_path))?;

    let summary = simulate(config, &args);
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("failed to render summary")?
    );

    if args.prometheus {
        let metrics = crate::ops::observability::CooldownMetrics::new();
        metrics.record_snapshot(&summary.after_cleanup);
        print!("{}", metrics.export());
    }
    Ok(())
}
