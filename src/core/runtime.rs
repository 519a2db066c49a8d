//! Process runtime for the `hourglass` binary.
//!
//! The runtime owns one [`CooldownManager`] for the lifetime of the process:
//! - Start: validate config → build manager → start background cleanup
//! - Stop: cancel cleanup → clear all state

use crate::cooldown::{CooldownManager, TokioScheduler};
use crate::core::config::Config;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Actor identity used by the binary.
pub type ActorName = String;

/// Component health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    /// Component is starting.
    Starting,
    /// Component is healthy and operational.
    Healthy,
    /// Component is degraded but functional.
    Degraded,
    /// Component is stopping.
    Stopping,
    /// Component has stopped.
    Stopped,
}

/// Health status aggregated from all components.
#[derive(Debug, Clone)]
pub struct RuntimeHealth {
    /// Cooldown manager health.
    pub manager: ComponentHealth,
    /// Background cleanup health. Degraded when no scheduler is running.
    pub cleanup: ComponentHealth,
}

impl Default for RuntimeHealth {
    fn default() -> Self {
        Self {
            manager: ComponentHealth::Starting,
            cleanup: ComponentHealth::Starting,
        }
    }
}

impl RuntimeHealth {
    /// Check if the runtime can serve cooldown queries.
    pub fn is_ready(&self) -> bool {
        matches!(
            (self.manager, self.cleanup),
            (
                ComponentHealth::Healthy,
                ComponentHealth::Healthy | ComponentHealth::Degraded
            )
        )
    }
}

/// Runtime holding the process-wide cooldown manager.
pub struct Runtime {
    /// Configuration.
    config: Arc<Config>,

    /// The manager, once started.
    manager: Option<Arc<CooldownManager<ActorName>>>,

    /// Runtime health status.
    health: RuntimeHealth,

    /// Whether the runtime is running.
    running: Arc<AtomicBool>,

    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,

    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,
}

impl Runtime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            manager: None,
            health: RuntimeHealth::default(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the manager (if started).
    pub fn manager(&self) -> Option<&Arc<CooldownManager<ActorName>>> {
        self.manager.as_ref()
    }

    /// Get the current health status.
    pub fn health(&self) -> &RuntimeHealth {
        &self.health
    }

    /// Check if the runtime is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Build the manager and start background cleanup.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        tracing::info!(
            cleanup_interval_ms = self.config.cleanup.interval_ms,
            tick_source = %self.config.cleanup.tick_source,
            "starting hourglass runtime"
        );

        let scheduler = TokioScheduler::current().context("no tokio runtime for cleanup")?;
        let manager = CooldownManager::builder((*self.config).clone())
            .with_scheduler(Arc::new(scheduler))
            .build();

        self.health.manager = ComponentHealth::Healthy;
        self.health.cleanup = if manager.has_background_cleanup() {
            ComponentHealth::Healthy
        } else {
            ComponentHealth::Degraded
        };
        self.manager = Some(Arc::new(manager));
        self.running.store(true, Ordering::Release);

        tracing::info!("hourglass runtime started");
        Ok(())
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Run until Ctrl-C or [`shutdown`](Self::shutdown), then stop.
    pub async fn run(&mut self) -> Result<()> {
        self.start()?;

        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("shutdown signal received (SIGINT)");
            }
            _ = async {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            } => {
                tracing::info!("shutdown requested by component");
            }
        }

        self.stop();
        Ok(())
    }

    /// Stop background cleanup and drop all cooldown state.
    pub fn stop(&mut self) {
        tracing::info!("stopping hourglass runtime");
        self.running.store(false, Ordering::Release);
        let _ = self.shutdown_tx.send(true);

        self.health.cleanup = ComponentHealth::Stopping;
        self.health.manager = ComponentHealth::Stopping;
        if let Some(manager) = self.manager.as_ref() {
            let snapshot = manager.metrics_snapshot();
            tracing::info!(
                entries = snapshot.entries_tracked(),
                cleanup_passes = snapshot.cleanup_passes,
                "final cooldown state"
            );
            manager.shutdown();
        }
        self.health.cleanup = ComponentHealth::Stopped;
        self.health.manager = ComponentHealth::Stopped;

        tracing::info!("hourglass runtime stopped");
    }
}
