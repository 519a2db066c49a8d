//! Cooldown facade.
//!
//! [`CooldownManager`] is the one object callers hold. It owns every store,
//! index and registry, and is passed by reference (usually behind an `Arc`)
//! to whatever needs cooldowns. Nothing here is a process global.
//!
//! # Time domains
//!
//! | Class    | Unit          | "now" comes from        | Key comparison   |
//! |----------|---------------|-------------------------|------------------|
//! | Spells   | [`Tick`]      | the caller, every call  | case-sensitive   |
//! | Commands | [`EpochMillis`] | the injected clock    | case-insensitive |
//!
//! # Failure model
//!
//! Every operation is total. Empty keys, negative ticks and non-positive
//! durations degrade to "no-op" or "not on cooldown". The only signaled
//! condition is [`CooldownError::OnCooldown`] from the command checks.

use crate::cooldown::expiry::{ExpiryDomain, ExpiryIndex, RemovalCallback};
use crate::cooldown::overrides::{OverrideRegistry, ResourceDescriptor};
use crate::cooldown::scheduler::{
    CleanupReport, CleanupScheduler, PeriodicScheduler, ScheduledTask, TokioScheduler,
};
use crate::cooldown::store::{ActorKeyedStore, GlobalStore};
use crate::cooldown::{ActorKey, Caller};
use crate::core::config::{Config, CooldownsConfig};
use crate::core::error::{CooldownError, CooldownResult};
use crate::core::time::{
    EpochMillis, MillisClock, ObservedTickSource, SystemClock, Tick, TickSource, TickSourceType,
    WallClockTickSource,
};
use crate::ops::observability::{CooldownMetrics, DomainBuckets, MetricsSnapshot};
use parking_lot::Mutex;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Builder for [`CooldownManager`].
pub struct CooldownManagerBuilder<A: ActorKey> {
    config: Config,
    clock: Option<Arc<dyn MillisClock>>,
    ticks: Option<Arc<dyn TickSource>>,
    scheduler: Option<Arc<dyn PeriodicScheduler>>,
    _actor: PhantomData<fn() -> A>,
}

impl<A: ActorKey> CooldownManagerBuilder<A> {
    fn new(config: Config) -> Self {
        Self {
            config,
            clock: None,
            ticks: None,
            scheduler: None,
            _actor: PhantomData,
        }
    }

    /// Millisecond clock for the command domain. Defaults to [`SystemClock`].
    pub fn with_clock(mut self, clock: Arc<dyn MillisClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Tick source the cleanup pass drains the spell domain against.
    ///
    /// Defaults to `cleanup.tick_source`: an [`ObservedTickSource`] fed by
    /// the ticks passed to queries, or a [`WallClockTickSource`] at
    /// `cleanup.ms_per_tick` when configured.
    pub fn with_tick_source(mut self, ticks: Arc<dyn TickSource>) -> Self {
        self.ticks = Some(ticks);
        self
    }

    /// Periodic facility for background cleanup.
    ///
    /// Defaults to the ambient tokio runtime, if there is one.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn PeriodicScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Build the manager and start background cleanup if possible.
    ///
    /// An unavailable scheduler is not an error: the manager works, and
    /// cleanup runs only when [`CooldownManager::run_cleanup`] is called.
    pub fn build(self) -> CooldownManager<A> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let mut observed = None;
        let ticks: Arc<dyn TickSource> = match self.ticks {
            Some(ticks) => ticks,
            None => match self.config.cleanup.tick_source {
                TickSourceType::WallClock => {
                    Arc::new(WallClockTickSource::new(self.config.cleanup.ms_per_tick))
                        as Arc<dyn TickSource>
                }
                TickSourceType::Observed | TickSourceType::Manual => {
                    let source = Arc::new(ObservedTickSource::new());
                    observed = Some(Arc::clone(&source));
                    source as Arc<dyn TickSource>
                }
            },
        };
        let mut cooldowns = self.config.cooldowns.clone();
        cooldowns.normalize();

        let spell_index = Arc::new(ExpiryIndex::new(ExpiryDomain::SpellTicks));
        let command_index = Arc::new(ExpiryIndex::new(ExpiryDomain::ActorCommandMillis));
        let global_index = Arc::new(ExpiryIndex::new(ExpiryDomain::GlobalCommandMillis));
        let overrides = Arc::new(OverrideRegistry::new(
            self.config.overrides.fingerprint_cache_max,
            self.config.overrides.override_set_max,
        ));
        let metrics = Arc::new(CooldownMetrics::new());

        let cleanup = Arc::new(CleanupScheduler::new(
            Arc::clone(&spell_index),
            Arc::clone(&command_index),
            Arc::clone(&global_index),
            Arc::clone(&overrides),
            Arc::clone(&metrics),
            Arc::clone(&ticks),
            Arc::clone(&clock),
        ));

        let scheduler: CooldownResult<Arc<dyn PeriodicScheduler>> = match self.scheduler {
            Some(scheduler) => Ok(scheduler),
            None => TokioScheduler::current().map(|s| Arc::new(s) as Arc<dyn PeriodicScheduler>),
        };
        let interval = self.config.cleanup.interval();
        let task = scheduler.and_then(|scheduler| {
            let pass = Arc::clone(&cleanup);
            scheduler.schedule_every(
                interval,
                Arc::new(move || {
                    pass.run_pass();
                }),
            )
        });
        let task = match task {
            Ok(task) => Some(task),
            Err(e) => {
                tracing::debug!(error = %e, "cleanup scheduler not started");
                None
            }
        };

        tracing::info!(
            cleanup_interval_ms = self.config.cleanup.interval_ms,
            tick_source = %ticks.source_type(),
            background_cleanup = task.is_some(),
            "cooldown manager started"
        );

        CooldownManager {
            cooldowns,
            spells: Arc::new(ActorKeyedStore::new()),
            commands: Arc::new(ActorKeyedStore::new()),
            global_commands: Arc::new(GlobalStore::new()),
            spell_index,
            command_index,
            global_index,
            overrides,
            metrics,
            clock,
            observed,
            cleanup,
            task: Mutex::new(task),
            shut_down: AtomicBool::new(false),
        }
    }
}

/// Per-actor, dual-time-domain cooldown tracker.
pub struct CooldownManager<A: ActorKey> {
    /// Configured default lengths.
    cooldowns: CooldownsConfig,
    /// Spell cooldowns, tick expiry.
    spells: Arc<ActorKeyedStore<A>>,
    /// Per-actor command cooldowns, epoch-ms expiry.
    commands: Arc<ActorKeyedStore<A>>,
    /// Console command cooldowns, epoch-ms expiry.
    global_commands: Arc<GlobalStore>,
    spell_index: Arc<ExpiryIndex>,
    command_index: Arc<ExpiryIndex>,
    global_index: Arc<ExpiryIndex>,
    overrides: Arc<OverrideRegistry<A>>,
    metrics: Arc<CooldownMetrics>,
    clock: Arc<dyn MillisClock>,
    /// Set when cleanup runs against the highest tick seen from callers.
    observed: Option<Arc<ObservedTickSource>>,
    cleanup: Arc<CleanupScheduler<A>>,
    /// Background cleanup handle, if a scheduler accepted the task.
    task: Mutex<Option<ScheduledTask>>,
    shut_down: AtomicBool,
}

impl<A: ActorKey> CooldownManager<A> {
    /// Start building a manager from `config`.
    pub fn builder(config: Config) -> CooldownManagerBuilder<A> {
        CooldownManagerBuilder::new(config)
    }

    /// Build with default clock, tick source and scheduler.
    pub fn new(config: Config) -> Self {
        Self::builder(config).build()
    }

    fn is_live(&self) -> bool {
        !self.shut_down.load(Ordering::SeqCst)
    }

    fn observe(&self, now_ticks: i64) {
        if let Some(observed) = &self.observed {
            observed.observe(Tick::clamped(now_ticks));
        }
    }

    /// A write that raced with [`shutdown`](Self::shutdown) may land after
    /// the maps were cleared; clear them again so nothing outlives it.
    fn discard_if_shut_down(&self) {
        if !self.is_live() {
            self.clear_state();
        }
    }

    // === Spell cooldowns (tick domain) ===

    /// Check if `actor` is cooling down on spell `key` at `now_ticks`.
    pub fn is_on_cooldown(&self, actor: &A, key: &str, now_ticks: i64) -> bool {
        self.remaining(actor, key, now_ticks) > 0
    }

    /// As [`is_on_cooldown`](Self::is_on_cooldown), but false while an
    /// override is active for `(actor, resource)`.
    pub fn is_on_cooldown_with_resource(
        &self,
        actor: &A,
        key: &str,
        now_ticks: i64,
        resource: Option<&dyn ResourceDescriptor>,
    ) -> bool {
        self.remaining_with_resource(actor, key, now_ticks, resource) > 0
    }

    /// Ticks left on spell `key` for `actor`, or 0.
    pub fn remaining(&self, actor: &A, key: &str, now_ticks: i64) -> u64 {
        self.remaining_with_resource(actor, key, now_ticks, None)
    }

    /// Ticks left on spell `key`, or 0 while an override is active.
    pub fn remaining_with_resource(
        &self,
        actor: &A,
        key: &str,
        now_ticks: i64,
        resource: Option<&dyn ResourceDescriptor>,
    ) -> u64 {
        if !self.is_live() {
            return 0;
        }
        self.observe(now_ticks);
        if key.is_empty() {
            return 0;
        }
        if let Some(resource) = resource {
            if self.overrides.is_disabled(actor, resource) {
                return 0;
            }
        }
        match self.spells.get(actor, key) {
            Some(until) => Tick::clamped(now_ticks).ticks_until(Tick::new(until)),
            None => 0,
        }
    }

    /// Put spell `key` on cooldown for `actor` until `until_ticks`.
    ///
    /// Last write wins. A negative tick is ignored.
    pub fn set_cooldown(&self, actor: &A, key: &str, until_ticks: i64) {
        if let Some(until) = Tick::from_signed(until_ticks) {
            self.set_spell_expiry(actor, key, until);
        }
    }

    /// Start spell `key` using its configured length.
    pub fn start_spell_cooldown(&self, actor: &A, key: &str, now_ticks: i64) {
        self.observe(now_ticks);
        let until = Tick::clamped(now_ticks).add(self.cooldowns.spell_ticks(key));
        self.set_spell_expiry(actor, key, until);
    }

    /// Configured length of spell `key` in ticks.
    pub fn spell_cooldown_ticks(&self, key: &str) -> u64 {
        self.cooldowns.spell_ticks(key)
    }

    /// Remove one spell cooldown. Returns true if one was present.
    pub fn clear_spell_cooldown(&self, actor: &A, key: &str) -> bool {
        self.spells.remove(actor, key).is_some()
    }

    fn set_spell_expiry(&self, actor: &A, key: &str, until: Tick) {
        if !self.is_live() || key.is_empty() {
            return;
        }
        self.spells.set(actor.clone(), key.to_string(), until.get());
        self.spell_index
            .schedule(until.get(), removal(&self.spells, actor, key, until.get()));
        self.discard_if_shut_down();
    }

    // === Command cooldowns (millisecond domain) ===

    /// Start `command` for `caller` unless it is still cooling down.
    ///
    /// `cooldown_seconds <= 0` means no cooldown. Actors are tracked
    /// individually; the console shares one namespace.
    pub fn check_command_cooldown(
        &self,
        caller: &Caller<A>,
        command: &str,
        cooldown_seconds: i64,
    ) -> CooldownResult<()> {
        self.check_command_cooldown_variant(caller, command, command, cooldown_seconds)
    }

    /// As [`check_command_cooldown`](Self::check_command_cooldown) for one
    /// variant of a command. Variants cool down independently.
    pub fn check_command_cooldown_variant(
        &self,
        caller: &Caller<A>,
        command: &str,
        variant: &str,
        cooldown_seconds: i64,
    ) -> CooldownResult<()> {
        if !self.is_live() || cooldown_seconds <= 0 || command.is_empty() {
            return Ok(());
        }

        let key = command_key(command, variant);
        let now = self.clock.now();
        let until = now.add_secs(cooldown_seconds as u64);

        let started = match caller {
            Caller::Actor(actor) => self
                .commands
                .try_start(actor.clone(), &key, now.get(), until.get())
                .map(|()| {
                    self.command_index
                        .schedule(until.get(), removal(&self.commands, actor, &key, until.get()))
                }),
            Caller::Console => self
                .global_commands
                .try_start(&key, now.get(), until.get())
                .map(|()| {
                    self.global_index
                        .schedule(until.get(), global_removal(&self.global_commands, &key, until.get()))
                }),
        };
        self.discard_if_shut_down();

        started.map_err(|existing| {
            let remaining = now.whole_secs_until(EpochMillis::new(existing));
            self.metrics.record_command_rejection();
            tracing::trace!(%caller, command = %key, remaining, "command on cooldown");
            CooldownError::on_cooldown(command, remaining)
        })
    }

    /// Check `command` using its configured length.
    pub fn check_configured_command_cooldown(
        &self,
        caller: &Caller<A>,
        command: &str,
    ) -> CooldownResult<()> {
        let seconds = i64::try_from(self.cooldowns.command_seconds(command)).unwrap_or(i64::MAX);
        self.check_command_cooldown(caller, command, seconds)
    }

    /// Configured length of `command` in seconds (0 = none).
    pub fn command_cooldown_seconds(&self, command: &str) -> u64 {
        self.cooldowns.command_seconds(command)
    }

    /// Whole seconds left on `command` for `caller`, or 0.
    pub fn command_cooldown_remaining(&self, caller: &Caller<A>, command: &str) -> u64 {
        self.command_cooldown_remaining_variant(caller, command, command)
    }

    /// Whole seconds left on one variant of `command`, or 0.
    pub fn command_cooldown_remaining_variant(
        &self,
        caller: &Caller<A>,
        command: &str,
        variant: &str,
    ) -> u64 {
        if !self.is_live() || command.is_empty() {
            return 0;
        }
        let key = command_key(command, variant);
        let until = match caller {
            Caller::Actor(actor) => self.commands.get(actor, &key),
            Caller::Console => self.global_commands.get(&key),
        };
        until
            .map(|until| self.clock.now().whole_secs_until(EpochMillis::new(until)))
            .unwrap_or(0)
    }

    /// Remove one per-actor command cooldown. Returns true if one was present.
    pub fn clear_command_cooldown(&self, actor: &A, command: &str, variant: &str) -> bool {
        self.commands
            .remove(actor, &command_key(command, variant))
            .is_some()
    }

    /// Remove one console command cooldown. Returns true if one was present.
    pub fn clear_global_cooldown(&self, command: &str, variant: &str) -> bool {
        self.global_commands
            .remove(&command_key(command, variant))
            .is_some()
    }

    /// Remove every console command cooldown.
    pub fn clear_global_cooldowns(&self) {
        self.global_commands.clear();
    }

    // === Actors and overrides ===

    /// Drop every spell cooldown, command cooldown and override for `actor`.
    pub fn clear_actor(&self, actor: &A) {
        let spells = self.spells.clear_actor(actor);
        let commands = self.commands.clear_actor(actor);
        let overrides = self.overrides.clear_actor(actor);
        tracing::debug!(%actor, spells, commands, overrides, "actor cooldowns cleared");
    }

    /// Enable or remove the enforcement override for `(actor, resource)`.
    pub fn set_override(&self, actor: &A, resource: &dyn ResourceDescriptor, disabled: bool) {
        if !self.is_live() {
            return;
        }
        self.overrides.set_disabled(actor, resource, disabled);
        self.discard_if_shut_down();
    }

    /// Check if enforcement is suppressed for `(actor, resource)`.
    pub fn is_override_active(&self, actor: &A, resource: &dyn ResourceDescriptor) -> bool {
        self.is_live() && self.overrides.is_disabled(actor, resource)
    }

    // === Cleanup, metrics, lifecycle ===

    /// Run one cleanup pass now, at the tick source's and clock's time.
    pub fn run_cleanup(&self) -> CleanupReport {
        self.cleanup.run_pass()
    }

    /// Run one cleanup pass at an explicit tick and millisecond.
    pub fn run_cleanup_at(&self, tick: Tick, now: EpochMillis) -> CleanupReport {
        self.cleanup.run_pass_at(tick, now)
    }

    /// Point-in-time counts for every store, index and registry.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        let mut buckets = DomainBuckets::default();
        buckets.set(ExpiryDomain::SpellTicks, self.spell_index.bucket_count() as u64);
        buckets.set(
            ExpiryDomain::ActorCommandMillis,
            self.command_index.bucket_count() as u64,
        );
        buckets.set(
            ExpiryDomain::GlobalCommandMillis,
            self.global_index.bucket_count() as u64,
        );

        MetricsSnapshot {
            spell_actors: self.spells.actor_count() as u64,
            command_actors: self.commands.actor_count() as u64,
            spell_entries: self.spells.entry_count() as u64,
            command_entries: self.commands.entry_count() as u64,
            global_command_entries: self.global_commands.len() as u64,
            overrides_active: self.overrides.len() as u64,
            fingerprint_cache_size: self.overrides.cache().len() as u64,
            buckets,
            last_drained_buckets: self.metrics.last_drained_buckets(),
            last_cleanup_duration_nanos: self.metrics.last_cleanup_duration_nanos(),
            cleanup_passes: self.metrics.cleanup_passes(),
            callback_failures: self.metrics.callback_failures(),
            drain_failures: self.metrics.drain_failures(),
        }
    }

    /// Metrics in Prometheus text format.
    pub fn export_metrics(&self) -> String {
        self.metrics.record_snapshot(&self.metrics_snapshot());
        self.metrics.export()
    }

    /// The metrics collector.
    pub fn metrics(&self) -> &CooldownMetrics {
        &self.metrics
    }

    /// Configured default lengths.
    pub fn cooldowns(&self) -> &CooldownsConfig {
        &self.cooldowns
    }

    /// Check if a periodic cleanup task is running.
    pub fn has_background_cleanup(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|task| !task.is_cancelled())
            .unwrap_or(false)
    }

    /// Stop background cleanup and drop all state.
    ///
    /// Idempotent. Afterwards writes are ignored and every query reports
    /// "not on cooldown".
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(task) = self.task.lock().take() {
            task.cancel();
        }

        self.clear_state();
        tracing::info!("cooldown manager shut down");
    }

    fn clear_state(&self) {
        self.spells.clear();
        self.commands.clear();
        self.global_commands.clear();
        self.spell_index.clear();
        self.command_index.clear();
        self.global_index.clear();
        self.overrides.clear();
    }

    /// Check if [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        !self.is_live()
    }
}

impl<A: ActorKey> fmt::Debug for CooldownManager<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CooldownManager")
            .field("spell_actors", &self.spells.actor_count())
            .field("command_actors", &self.commands.actor_count())
            .field("global_commands", &self.global_commands.len())
            .field("overrides", &self.overrides.len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Stored key for a command variant: `lowercase(command + "." + variant)`.
fn command_key(command: &str, variant: &str) -> String {
    format!("{}.{}", command, variant).to_lowercase()
}

fn removal<A: ActorKey>(
    store: &Arc<ActorKeyedStore<A>>,
    actor: &A,
    key: &str,
    until: u64,
) -> RemovalCallback {
    let store = Arc::clone(store);
    let actor = actor.clone();
    let key = key.to_string();
    Arc::new(move || {
        store.remove_if_eq(&actor, &key, until);
    })
}

fn global_removal(store: &Arc<GlobalStore>, key: &str, until: u64) -> RemovalCallback {
    let store = Arc::clone(store);
    let key = key.to_string();
    Arc::new(move || {
        store.remove_if_eq(&key, until);
    })
}
