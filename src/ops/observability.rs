//! Metrics reporting.
//!
//! Metric namespaces:
//! - hourglass.cleanup.*
//! - hourglass.expiry.{domain}.*
//! - hourglass.store.*
//! - hourglass.overrides.*
//! - hourglass.command.*

use crate::cooldown::{CleanupReport, ExpiryDomain};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metric names.
pub mod metrics {
    /// Completed cleanup passes counter.
    pub const CLEANUP_PASSES_TOTAL: &str = "hourglass.cleanup.passes_total";
    /// Duration of the most recent cleanup pass, nanoseconds.
    pub const CLEANUP_LAST_DURATION_NS: &str = "hourglass.cleanup.last_duration_ns";
    /// Cleanup pass duration histogram, milliseconds.
    pub const CLEANUP_DURATION_MS: &str = "hourglass.cleanup.duration_ms";
    /// Removal callbacks that panicked.
    pub const CALLBACK_FAILURES_TOTAL: &str = "hourglass.cleanup.callback_failures_total";
    /// Whole-domain drains that failed.
    pub const DRAIN_FAILURES_TOTAL: &str = "hourglass.cleanup.drain_failures_total";
    /// Live bucket gauge, per domain: `hourglass.expiry.{domain}.buckets`.
    pub const EXPIRY_BUCKETS: &str = "hourglass.expiry.{domain}.buckets";
    /// Buckets drained in the last pass, per domain.
    pub const EXPIRY_DRAINED_BUCKETS: &str = "hourglass.expiry.{domain}.drained_buckets";
    /// Actors with at least one spell cooldown.
    pub const STORE_SPELL_ACTORS: &str = "hourglass.store.spell_actors";
    /// Actors with at least one command cooldown.
    pub const STORE_COMMAND_ACTORS: &str = "hourglass.store.command_actors";
    /// Live spell cooldown entries.
    pub const STORE_SPELL_ENTRIES: &str = "hourglass.store.spell_entries";
    /// Live per-actor command cooldown entries.
    pub const STORE_COMMAND_ENTRIES: &str = "hourglass.store.command_entries";
    /// Live console command cooldown entries.
    pub const STORE_GLOBAL_COMMAND_ENTRIES: &str = "hourglass.store.global_command_entries";
    /// Active overrides.
    pub const OVERRIDES_ACTIVE: &str = "hourglass.overrides.active";
    /// Cached fingerprints.
    pub const OVERRIDES_CACHE_SIZE: &str = "hourglass.overrides.cache_size";
    /// Overrides dropped by cap enforcement.
    pub const OVERRIDES_BULK_CLEARED_TOTAL: &str = "hourglass.overrides.bulk_cleared_total";
    /// Command checks rejected because the command was cooling down.
    pub const COMMAND_REJECTIONS_TOTAL: &str = "hourglass.command.rejections_total";

    /// Substitute a domain label into a per-domain metric name.
    pub fn for_domain(template: &str, domain: &str) -> String {
        template.replace("{domain}", domain)
    }
}

/// Metrics registry.
#[derive(Debug)]
pub struct MetricsRegistry {
    /// Counter metrics.
    counters: RwLock<HashMap<String, AtomicU64>>,
    /// Gauge metrics.
    gauges: RwLock<HashMap<String, AtomicU64>>,
    /// Histogram observations (count, sum, min, max).
    histograms: RwLock<HashMap<String, HistogramData>>,
}

impl MetricsRegistry {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            gauges: RwLock::new(HashMap::new()),
            histograms: RwLock::new(HashMap::new()),
        }
    }

    /// Increment a counter.
    pub fn counter_inc(&self, name: &str) {
        self.counter_add(name, 1);
    }

    /// Add to a counter.
    pub fn counter_add(&self, name: &str, value: u64) {
        if let Some(counter) = self.counters.read().get(name) {
            counter.fetch_add(value, Ordering::Relaxed);
            return;
        }

        self.counters
            .write()
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }

    /// Get counter value.
    pub fn counter_get(&self, name: &str) -> u64 {
        self.counters
            .read()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Set a gauge value.
    pub fn gauge_set(&self, name: &str, value: u64) {
        if let Some(gauge) = self.gauges.read().get(name) {
            gauge.store(value, Ordering::Relaxed);
            return;
        }

        self.gauges
            .write()
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .store(value, Ordering::Relaxed);
    }

    /// Get gauge value.
    pub fn gauge_get(&self, name: &str) -> u64 {
        self.gauges
            .read()
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Record a histogram observation.
    pub fn histogram_observe(&self, name: &str, value: f64) {
        if let Some(data) = self.histograms.read().get(name) {
            data.observe(value);
            return;
        }

        self.histograms
            .write()
            .entry(name.to_string())
            .or_insert_with(HistogramData::new)
            .observe(value);
    }

    /// Get histogram data.
    pub fn histogram_get(&self, name: &str) -> Option<HistogramSnapshot> {
        self.histograms.read().get(name).map(|h| h.snapshot())
    }

    /// Export metrics in Prometheus text format, sorted by name.
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        let counters = self.counters.read();
        let mut names: Vec<_> = counters.keys().collect();
        names.sort();
        for name in names {
            let prometheus_name = name.replace('.', "_");
            output.push_str(&format!(
                "# TYPE {} counter\n{} {}\n",
                prometheus_name,
                prometheus_name,
                counters[name].load(Ordering::Relaxed)
            ));
        }

        let gauges = self.gauges.read();
        let mut names: Vec<_> = gauges.keys().collect();
        names.sort();
        for name in names {
            let prometheus_name = name.replace('.', "_");
            output.push_str(&format!(
                "# TYPE {} gauge\n{} {}\n",
                prometheus_name,
                prometheus_name,
                gauges[name].load(Ordering::Relaxed)
            ));
        }

        let histograms = self.histograms.read();
        let mut names: Vec<_> = histograms.keys().collect();
        names.sort();
        for name in names {
            let prometheus_name = name.replace('.', "_");
            let snapshot = histograms[name].snapshot();
            output.push_str(&format!(
                "# TYPE {} histogram\n{}_count {}\n{}_sum {}\n",
                prometheus_name, prometheus_name, snapshot.count, prometheus_name, snapshot.sum
            ));
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct HistogramData {
    count: AtomicU64,
    stats: Mutex<(f64, f64, f64)>,
}

impl HistogramData {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            stats: Mutex::new((0.0, f64::MAX, f64::MIN)),
        }
    }

    fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        let mut stats = self.stats.lock();
        stats.0 += value;
        stats.1 = stats.1.min(value);
        stats.2 = stats.2.max(value);
    }

    fn snapshot(&self) -> HistogramSnapshot {
        let (sum, min, max) = *self.stats.lock();
        HistogramSnapshot {
            count: self.count.load(Ordering::Relaxed),
            sum,
            min,
            max,
        }
    }
}

/// Histogram snapshot.
#[derive(Debug, Clone)]
pub struct HistogramSnapshot {
    /// Number of observations.
    pub count: u64,
    /// Sum of all observations.
    pub sum: f64,
    /// Minimum value observed.
    pub min: f64,
    /// Maximum value observed.
    pub max: f64,
}

impl HistogramSnapshot {
    /// Calculate mean.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Per-domain bucket counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainBuckets {
    /// Spell (tick) domain.
    pub spell: u64,
    /// Per-actor command (millisecond) domain.
    pub command: u64,
    /// Console command (millisecond) domain.
    pub global_command: u64,
}

impl DomainBuckets {
    /// Value for one domain.
    pub fn get(&self, domain: ExpiryDomain) -> u64 {
        match domain {
            ExpiryDomain::SpellTicks => self.spell,
            ExpiryDomain::ActorCommandMillis => self.command,
            ExpiryDomain::GlobalCommandMillis => self.global_command,
        }
    }

    /// Set the value for one domain.
    pub fn set(&mut self, domain: ExpiryDomain, value: u64) {
        match domain {
            ExpiryDomain::SpellTicks => self.spell = value,
            ExpiryDomain::ActorCommandMillis => self.command = value,
            ExpiryDomain::GlobalCommandMillis => self.global_command = value,
        }
    }

    /// Sum across domains.
    pub fn total(&self) -> u64 {
        self.spell + self.command + self.global_command
    }
}

/// Read-only point-in-time view of the cooldown engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Actors with at least one spell cooldown.
    pub spell_actors: u64,
    /// Actors with at least one per-actor command cooldown.
    pub command_actors: u64,
    /// Live spell cooldown entries.
    pub spell_entries: u64,
    /// Live per-actor command cooldown entries.
    pub command_entries: u64,
    /// Live console command cooldown entries.
    pub global_command_entries: u64,
    /// Active overrides.
    pub overrides_active: u64,
    /// Cached resource fingerprints.
    pub fingerprint_cache_size: u64,
    /// Pending buckets per domain.
    pub buckets: DomainBuckets,
    /// Buckets drained per domain in the most recent cleanup pass.
    pub last_drained_buckets: DomainBuckets,
    /// Duration of the most recent cleanup pass.
    pub last_cleanup_duration_nanos: u64,
    /// Completed cleanup passes.
    pub cleanup_passes: u64,
    /// Removal callbacks that panicked.
    pub callback_failures: u64,
    /// Whole-domain drains that failed.
    pub drain_failures: u64,
}

impl MetricsSnapshot {
    /// Actors tracked across both per-actor stores.
    ///
    /// An actor holding both spell and command cooldowns counts twice.
    pub fn actors_tracked(&self) -> u64 {
        self.spell_actors + self.command_actors
    }

    /// Live entries across every store.
    pub fn entries_tracked(&self) -> u64 {
        self.spell_entries + self.command_entries + self.global_command_entries
    }
}

/// Cooldown engine metrics collector.
#[derive(Debug, Default)]
pub struct CooldownMetrics {
    /// Core registry.
    registry: MetricsRegistry,
}

impl CooldownMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            registry: MetricsRegistry::new(),
        }
    }

    /// Get the underlying registry.
    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    // === Cleanup ===

    /// Record one completed cleanup pass.
    pub fn record_cleanup(&self, report: &CleanupReport) {
        let nanos = u64::try_from(report.duration.as_nanos()).unwrap_or(u64::MAX);
        self.registry.counter_inc(metrics::CLEANUP_PASSES_TOTAL);
        self.registry
            .gauge_set(metrics::CLEANUP_LAST_DURATION_NS, nanos);
        self.registry.histogram_observe(
            metrics::CLEANUP_DURATION_MS,
            report.duration.as_secs_f64() * 1_000.0,
        );

        for domain in ExpiryDomain::ALL {
            let drained = report
                .drain(domain)
                .map(|drain| drain.buckets_drained as u64)
                .unwrap_or(0);
            self.registry.gauge_set(
                &metrics::for_domain(metrics::EXPIRY_DRAINED_BUCKETS, domain.as_str()),
                drained,
            );
            self.registry.gauge_set(
                &metrics::for_domain(metrics::EXPIRY_BUCKETS, domain.as_str()),
                report.remaining_buckets.get(domain),
            );
        }

        let callback_failures: usize = report
            .drains
            .iter()
            .map(|drain| drain.callback_failures)
            .sum();
        if callback_failures > 0 {
            self.registry
                .counter_add(metrics::CALLBACK_FAILURES_TOTAL, callback_failures as u64);
        }
        if !report.failed_domains.is_empty() {
            self.registry.counter_add(
                metrics::DRAIN_FAILURES_TOTAL,
                report.failed_domains.len() as u64,
            );
        }
        if report.caps.overrides_cleared > 0 {
            self.registry.counter_add(
                metrics::OVERRIDES_BULK_CLEARED_TOTAL,
                report.caps.overrides_cleared as u64,
            );
        }
    }

    // === Commands ===

    /// Record a command rejected for cooling down.
    pub fn record_command_rejection(&self) {
        self.registry.counter_inc(metrics::COMMAND_REJECTIONS_TOTAL);
    }

    /// Last recorded per-domain drained bucket counts.
    pub fn last_drained_buckets(&self) -> DomainBuckets {
        let mut buckets = DomainBuckets::default();
        for domain in ExpiryDomain::ALL {
            buckets.set(
                domain,
                self.registry.gauge_get(&metrics::for_domain(
                    metrics::EXPIRY_DRAINED_BUCKETS,
                    domain.as_str(),
                )),
            );
        }
        buckets
    }

    /// Last recorded cleanup duration in nanoseconds.
    pub fn last_cleanup_duration_nanos(&self) -> u64 {
        self.registry.gauge_get(metrics::CLEANUP_LAST_DURATION_NS)
    }

    /// Completed cleanup passes.
    pub fn cleanup_passes(&self) -> u64 {
        self.registry.counter_get(metrics::CLEANUP_PASSES_TOTAL)
    }

    /// Removal callbacks that panicked.
    pub fn callback_failures(&self) -> u64 {
        self.registry.counter_get(metrics::CALLBACK_FAILURES_TOTAL)
    }

    /// Whole-domain drains that failed.
    pub fn drain_failures(&self) -> u64 {
        self.registry.counter_get(metrics::DRAIN_FAILURES_TOTAL)
    }

    /// Publish store and override sizes from a snapshot as gauges.
    pub fn record_snapshot(&self, snapshot: &MetricsSnapshot) {
        self.registry
            .gauge_set(metrics::STORE_SPELL_ACTORS, snapshot.spell_actors);
        self.registry
            .gauge_set(metrics::STORE_COMMAND_ACTORS, snapshot.command_actors);
        self.registry
            .gauge_set(metrics::STORE_SPELL_ENTRIES, snapshot.spell_entries);
        self.registry
            .gauge_set(metrics::STORE_COMMAND_ENTRIES, snapshot.command_entries);
        self.registry.gauge_set(
            metrics::STORE_GLOBAL_COMMAND_ENTRIES,
            snapshot.global_command_entries,
        );
        self.registry
            .gauge_set(metrics::OVERRIDES_ACTIVE, snapshot.overrides_active);
        self.registry
            .gauge_set(metrics::OVERRIDES_CACHE_SIZE, snapshot.fingerprint_cache_size);
        for domain in ExpiryDomain::ALL {
            self.registry.gauge_set(
                &metrics::for_domain(metrics::EXPIRY_BUCKETS, domain.as_str()),
                snapshot.buckets.get(domain),
            );
        }
    }

    /// Export all metrics.
    pub fn export(&self) -> String {
        self.registry.export_prometheus()
    }
}
