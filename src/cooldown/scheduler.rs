//! Periodic cleanup.
//!
//! Two halves:
//! - [`PeriodicScheduler`] is the host facility that runs a task on an
//!   interval. [`TokioScheduler`] drives it from a tokio runtime,
//!   [`NoopScheduler`] models a host with no periodic execution, and
//!   [`ManualScheduler`] lets tests fire passes explicitly.
//! - [`CleanupScheduler`] is the pass itself: drain every expiry domain,
//!   enforce override caps, record metrics.
//!
//! A pass never panics past its own boundary. Each domain drain runs under
//! its own guard, so a failure in one domain still lets the others run.

use crate::cooldown::expiry::{DrainReport, ExpiryDomain, ExpiryIndex};
use crate::cooldown::overrides::{CapReport, OverrideRegistry};
use crate::cooldown::ActorKey;
use crate::core::error::{CooldownError, CooldownResult};
use crate::core::time::{EpochMillis, MillisClock, Tick, TickSource};
use crate::ops::observability::{CooldownMetrics, DomainBuckets};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;

/// Work run on every period.
pub type PeriodicTask = Arc<dyn Fn() + Send + Sync>;

/// Host facility that runs a task repeatedly.
pub trait PeriodicScheduler: Send + Sync {
    /// Run `task` every `period`, first run one period from now.
    ///
    /// Returns [`CooldownError::SchedulerUnavailable`] when the host cannot
    /// run periodic work.
    fn schedule_every(&self, period: Duration, task: PeriodicTask)
        -> CooldownResult<ScheduledTask>;
}

/// Handle to a scheduled periodic task. Cancels on drop.
pub struct ScheduledTask {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ScheduledTask {
    /// Wrap the action that stops the task.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// Stop the task. Returns false if it was already cancelled.
    pub fn cancel(&self) -> bool {
        let action = self.cancel.lock().take();
        match action {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }

    /// Check if the task has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.lock().is_none()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Runs periodic tasks on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Use the runtime the caller is running in.
    pub fn current() -> CooldownResult<Self> {
        Handle::try_current()
            .map(Self::from_handle)
            .map_err(|e| CooldownError::scheduler_unavailable(e.to_string()))
    }

    /// Use an explicit runtime handle.
    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl PeriodicScheduler for TokioScheduler {
    fn schedule_every(
        &self,
        period: Duration,
        task: PeriodicTask,
    ) -> CooldownResult<ScheduledTask> {
        if period.is_zero() {
            return Err(CooldownError::scheduler_unavailable(
                "period must be non-zero",
            ));
        }

        let join = self.handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if catch_unwind(AssertUnwindSafe(|| task())).is_err() {
                    tracing::error!("periodic task panicked");
                }
            }
        });

        Ok(ScheduledTask::new(move || join.abort()))
    }
}

/// Host with no periodic execution.
#[derive(Debug, Clone, Default)]
pub struct NoopScheduler;

impl PeriodicScheduler for NoopScheduler {
    fn schedule_every(
        &self,
        _period: Duration,
        _task: PeriodicTask,
    ) -> CooldownResult<ScheduledTask> {
        Err(CooldownError::scheduler_unavailable(
            "no periodic execution available",
        ))
    }
}

struct ManualEntry {
    period: Duration,
    task: PeriodicTask,
    cancelled: Arc<AtomicBool>,
}

/// Scheduler whose tasks only run when [`ManualScheduler::fire`] is called.
#[derive(Default)]
pub struct ManualScheduler {
    tasks: Mutex<Vec<ManualEntry>>,
}

impl ManualScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every live task once. Returns how many ran.
    pub fn fire(&self) -> usize {
        let live: Vec<PeriodicTask> = {
            let mut tasks = self.tasks.lock();
            tasks.retain(|entry| !entry.cancelled.load(Ordering::Acquire));
            tasks.iter().map(|entry| Arc::clone(&entry.task)).collect()
        };
        for task in &live {
            task();
        }
        live.len()
    }

    /// Number of live tasks.
    pub fn task_count(&self) -> usize {
        self.tasks
            .lock()
            .iter()
            .filter(|entry| !entry.cancelled.load(Ordering::Acquire))
            .count()
    }

    /// Periods of the live tasks, in registration order.
    pub fn periods(&self) -> Vec<Duration> {
        self.tasks
            .lock()
            .iter()
            .filter(|entry| !entry.cancelled.load(Ordering::Acquire))
            .map(|entry| entry.period)
            .collect()
    }
}

impl PeriodicScheduler for ManualScheduler {
    fn schedule_every(
        &self,
        period: Duration,
        task: PeriodicTask,
    ) -> CooldownResult<ScheduledTask> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.tasks.lock().push(ManualEntry {
            period,
            task,
            cancelled: Arc::clone(&cancelled),
        });
        Ok(ScheduledTask::new(move || {
            cancelled.store(true, Ordering::Release);
        }))
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("tasks", &self.task_count())
            .finish()
    }
}

/// Outcome of one cleanup pass.
#[derive(Debug, Clone)]
pub struct CleanupReport {
    /// Tick the spell domain was drained at.
    pub tick: u64,
    /// Epoch millisecond the command domains were drained at.
    pub millis: u64,
    /// Successful drains, in domain order.
    pub drains: Vec<DrainReport>,
    /// Domains whose drain failed as a whole.
    pub failed_domains: Vec<ExpiryDomain>,
    /// What override cap enforcement cleared.
    pub caps: CapReport,
    /// Buckets still pending after the pass.
    pub remaining_buckets: DomainBuckets,
    /// Wall time the pass took.
    pub duration: Duration,
}

impl CleanupReport {
    /// Drain report for `domain`, if that drain succeeded.
    pub fn drain(&self, domain: ExpiryDomain) -> Option<&DrainReport> {
        self.drains.iter().find(|drain| drain.domain == domain)
    }

    /// Total callbacks run across domains.
    pub fn callbacks_run(&self) -> usize {
        self.drains.iter().map(|drain| drain.callbacks_run).sum()
    }

    /// Check if every domain drained without a whole-domain failure.
    pub fn is_clean(&self) -> bool {
        self.failed_domains.is_empty()
    }
}

/// The periodic cleanup pass over every expiry domain.
pub struct CleanupScheduler<A: ActorKey> {
    spell_index: Arc<ExpiryIndex>,
    command_index: Arc<ExpiryIndex>,
    global_index: Arc<ExpiryIndex>,
    overrides: Arc<OverrideRegistry<A>>,
    metrics: Arc<CooldownMetrics>,
    ticks: Arc<dyn TickSource>,
    clock: Arc<dyn MillisClock>,
}

impl<A: ActorKey> CleanupScheduler<A> {
    /// Create a cleanup pass over the given indices.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        spell_index: Arc<ExpiryIndex>,
        command_index: Arc<ExpiryIndex>,
        global_index: Arc<ExpiryIndex>,
        overrides: Arc<OverrideRegistry<A>>,
        metrics: Arc<CooldownMetrics>,
        ticks: Arc<dyn TickSource>,
        clock: Arc<dyn MillisClock>,
    ) -> Self {
        Self {
            spell_index,
            command_index,
            global_index,
            overrides,
            metrics,
            ticks,
            clock,
        }
    }

    fn index(&self, domain: ExpiryDomain) -> &ExpiryIndex {
        match domain {
            ExpiryDomain::SpellTicks => &self.spell_index,
            ExpiryDomain::ActorCommandMillis => &self.command_index,
            ExpiryDomain::GlobalCommandMillis => &self.global_index,
        }
    }

    /// Run one pass at the current tick and wall-clock time.
    pub fn run_pass(&self) -> CleanupReport {
        self.run_pass_at(self.ticks.current_tick(), self.clock.now())
    }

    /// Run one pass at an explicit tick and millisecond.
    pub fn run_pass_at(&self, tick: Tick, now: EpochMillis) -> CleanupReport {
        let started = Instant::now();
        let mut drains = Vec::with_capacity(ExpiryDomain::ALL.len());
        let mut failed_domains = Vec::new();

        for domain in ExpiryDomain::ALL {
            let index = self.index(domain);
            let due = match domain {
                ExpiryDomain::SpellTicks => tick.get(),
                ExpiryDomain::ActorCommandMillis | ExpiryDomain::GlobalCommandMillis => now.get(),
            };
            match catch_unwind(AssertUnwindSafe(|| index.drain_due(due))) {
                Ok(report) => drains.push(report),
                Err(payload) => {
                    let err = CooldownError::DrainFailed {
                        domain: domain.as_str(),
                        message: panic_message(payload.as_ref()),
                    };
                    tracing::error!(error = %err, "cleanup drain failed");
                    failed_domains.push(domain);
                }
            }
        }

        let caps = match catch_unwind(AssertUnwindSafe(|| self.overrides.enforce_caps())) {
            Ok(caps) => caps,
            Err(payload) => {
                tracing::error!(
                    message = %panic_message(payload.as_ref()),
                    "override cap enforcement failed"
                );
                CapReport::default()
            }
        };
        if caps.overrides_cleared > 0 {
            tracing::warn!(
                overrides_cleared = caps.overrides_cleared,
                "override set over capacity, cleared"
            );
        }
        if caps.cache_cleared > 0 {
            tracing::debug!(cache_cleared = caps.cache_cleared, "fingerprint cache reset");
        }

        let mut remaining_buckets = DomainBuckets::default();
        for domain in ExpiryDomain::ALL {
            remaining_buckets.set(domain, self.index(domain).bucket_count() as u64);
        }

        let report = CleanupReport {
            tick: tick.get(),
            millis: now.get(),
            drains,
            failed_domains,
            caps,
            remaining_buckets,
            duration: started.elapsed(),
        };
        self.metrics.record_cleanup(&report);

        tracing::trace!(
            tick = report.tick,
            millis = report.millis,
            callbacks = report.callbacks_run(),
            duration_us = report.duration.as_micros() as u64,
            "cleanup pass complete"
        );
        report
    }
}

impl<A: ActorKey> fmt::Debug for CleanupScheduler<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupScheduler")
            .field("tick_source", &self.ticks.source_type())
            .field("spell_buckets", &self.spell_index.bucket_count())
            .field("command_buckets", &self.command_index.bucket_count())
            .field("global_buckets", &self.global_index.bucket_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::{ManualClock, ManualTickSource};
    use std::sync::atomic::AtomicUsize;

    struct Fixture {
        spell: Arc<ExpiryIndex>,
        command: Arc<ExpiryIndex>,
        global: Arc<ExpiryIndex>,
        overrides: Arc<OverrideRegistry<u32>>,
        metrics: Arc<CooldownMetrics>,
        cleanup: CleanupScheduler<u32>,
    }

    fn fixture() -> Fixture {
        let spell = Arc::new(ExpiryIndex::new(ExpiryDomain::SpellTicks));
        let command = Arc::new(ExpiryIndex::new(ExpiryDomain::ActorCommandMillis));
        let global = Arc::new(ExpiryIndex::new(ExpiryDomain::GlobalCommandMillis));
        let overrides = Arc::new(OverrideRegistry::new(4, 4));
        let metrics = Arc::new(CooldownMetrics::new());
        let cleanup = CleanupScheduler::new(
            Arc::clone(&spell),
            Arc::clone(&command),
            Arc::clone(&global),
            Arc::clone(&overrides),
            Arc::clone(&metrics),
            Arc::new(ManualTickSource::new(Tick::zero())),
            Arc::new(ManualClock::new(EpochMillis::new(0))),
        );
        Fixture {
            spell,
            command,
            global,
            overrides,
            metrics,
            cleanup,
        }
    }

    fn counting(hits: &Arc<AtomicUsize>) -> crate::cooldown::RemovalCallback {
        let hits = Arc::clone(hits);
        Arc::new(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_pass_uses_each_domains_clock() {
        let f = fixture();
        let hits = Arc::new(AtomicUsize::new(0));
        f.spell.schedule(10, counting(&hits));
        f.command.schedule(5_000, counting(&hits));
        f.global.schedule(9_000, counting(&hits));

        // Tick 10 is due; 5 000 ms is due; 9 000 ms is not.
        let report = f.cleanup.run_pass_at(Tick::new(10), EpochMillis::new(5_000));
        assert!(report.is_clean());
        assert_eq!(report.callbacks_run(), 2);
        assert_eq!(report.remaining_buckets.global_command, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(f.metrics.cleanup_passes(), 1);
    }

    #[test]
    fn test_pass_enforces_override_caps() {
        let f = fixture();
        for actor in 0..5u32 {
            f.overrides
                .set_disabled(&actor, &crate::cooldown::Resource::unlabeled("stick"), true);
        }
        let report = f.cleanup.run_pass_at(Tick::zero(), EpochMillis::new(0));
        assert_eq!(report.caps.overrides_cleared, 5);
        assert!(f.overrides.is_empty());
    }

    #[test]
    fn test_callback_panic_is_recorded_not_propagated() {
        let f = fixture();
        let hits = Arc::new(AtomicUsize::new(0));
        f.spell.schedule(1, Arc::new(|| panic!("bad callback")));
        f.spell.schedule(1, counting(&hits));

        let report = f.cleanup.run_pass_at(Tick::new(1), EpochMillis::new(0));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            report
                .drain(ExpiryDomain::SpellTicks)
                .map(|d| d.callback_failures),
            Some(1)
        );
        assert_eq!(f.metrics.callback_failures(), 1);
    }

    #[test]
    fn test_scheduled_task_cancel_is_idempotent() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let task = ScheduledTask::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(task.cancel());
        assert!(!task.cancel());
        assert!(task.is_cancelled());
        drop(task);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_noop_scheduler_is_unavailable() {
        let result = NoopScheduler.schedule_every(Duration::from_secs(1), Arc::new(|| {}));
        assert!(matches!(
            result,
            Err(CooldownError::SchedulerUnavailable { .. })
        ));
    }

    #[test]
    fn test_manual_scheduler_fire_and_cancel() {
        let scheduler = ManualScheduler::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let handle = scheduler
            .schedule_every(
                Duration::from_secs(60),
                Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        assert_eq!(scheduler.periods(), vec![Duration::from_secs(60)]);
        assert_eq!(scheduler.fire(), 1);
        handle.cancel();
        assert_eq!(scheduler.fire(), 0);
        assert_eq!(scheduler.task_count(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tokio_scheduler_requires_runtime() {
        assert!(TokioScheduler::current().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_runs_on_interval() {
        let scheduler = TokioScheduler::current().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let handle = scheduler
            .schedule_every(
                Duration::from_millis(100),
                Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        handle.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
