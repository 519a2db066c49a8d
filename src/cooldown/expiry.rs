//! Time-bucketed expiry index.
//!
//! Ordered map `expiry → queue of removal callbacks`. Draining walks buckets
//! from the front and stops at the first bucket in the future, so a cleanup
//! pass costs O(due buckets) rather than O(live entries). Drained buckets
//! are detached from the map before their callbacks run and are never
//! reinserted.
//!
//! # Stale callbacks
//!
//! An entry may be refreshed to a later expiry after its first callback was
//! queued. Callbacks therefore capture the exact expiry they were scheduled
//! for and perform a compare-and-remove against the store; a stale callback
//! is a no-op. The index itself does not know what a callback removes.
//!
//! # Concurrent schedule and drain
//!
//! A `schedule` can race a drain that is detaching the same bucket. The
//! scheduler re-checks the bucket after pushing and, if it was detached,
//! pushes again into a fresh bucket. Because callbacks are idempotent, the
//! occasional double run is harmless; a lost callback would leak an entry.

use crate::core::error::CooldownError;
use crossbeam_queue::SegQueue;
use crossbeam_skiplist::SkipMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Idempotent removal action queued in a bucket.
pub type RemovalCallback = Arc<dyn Fn() + Send + Sync>;

/// Which cooldown namespace an index serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpiryDomain {
    /// Per-actor spell cooldowns, keyed by tick.
    SpellTicks,
    /// Per-actor command cooldowns, keyed by epoch millisecond.
    ActorCommandMillis,
    /// Console command cooldowns, keyed by epoch millisecond.
    GlobalCommandMillis,
}

impl ExpiryDomain {
    /// Every domain, in cleanup order.
    pub const ALL: [ExpiryDomain; 3] = [
        ExpiryDomain::SpellTicks,
        ExpiryDomain::ActorCommandMillis,
        ExpiryDomain::GlobalCommandMillis,
    ];

    /// Stable label used in logs and metric names.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SpellTicks => "spell",
            Self::ActorCommandMillis => "command",
            Self::GlobalCommandMillis => "global_command",
        }
    }
}

impl std::fmt::Display for ExpiryDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one [`ExpiryIndex::drain_due`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Domain that was drained.
    pub domain: ExpiryDomain,
    /// Time the drain ran at.
    pub now: u64,
    /// Buckets detached and processed.
    pub buckets_drained: usize,
    /// Callbacks that ran to completion.
    pub callbacks_run: usize,
    /// Callbacks that panicked.
    pub callback_failures: usize,
}

impl DrainReport {
    fn empty(domain: ExpiryDomain, now: u64) -> Self {
        Self {
            domain,
            now,
            buckets_drained: 0,
            callbacks_run: 0,
            callback_failures: 0,
        }
    }
}

/// Ordered `expiry → callbacks` index for one time domain.
pub struct ExpiryIndex {
    /// Domain label.
    domain: ExpiryDomain,
    /// Buckets keyed by exact expiry.
    buckets: SkipMap<u64, SegQueue<RemovalCallback>>,
    /// Total callbacks scheduled.
    scheduled: AtomicU64,
    /// Total buckets drained.
    buckets_drained: AtomicU64,
    /// Total callback panics caught.
    callback_failures: AtomicU64,
}

impl ExpiryIndex {
    /// Create an empty index for `domain`.
    pub fn new(domain: ExpiryDomain) -> Self {
        Self {
            domain,
            buckets: SkipMap::new(),
            scheduled: AtomicU64::new(0),
            buckets_drained: AtomicU64::new(0),
            callback_failures: AtomicU64::new(0),
        }
    }

    /// Domain this index serves.
    pub fn domain(&self) -> ExpiryDomain {
        self.domain
    }

    /// Queue `callback` in the bucket for `expiry`, creating it if absent.
    pub fn schedule(&self, expiry: u64, callback: RemovalCallback) {
        loop {
            let bucket = self.buckets.get_or_insert_with(expiry, SegQueue::new);
            bucket.value().push(Arc::clone(&callback));
            if !bucket.is_removed() {
                break;
            }
        }
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    /// Detach and run every bucket with expiry `<= now`, oldest first.
    ///
    /// Each callback runs under its own panic guard; one failure does not
    /// stop the rest of the bucket or the remaining buckets.
    pub fn drain_due(&self, now: u64) -> DrainReport {
        let mut report = DrainReport::empty(self.domain, now);

        while let Some(bucket) = self.buckets.front() {
            if *bucket.key() > now {
                break;
            }
            // Another drainer got here first.
            if !bucket.remove() {
                continue;
            }
            report.buckets_drained += 1;

            while let Some(callback) = bucket.value().pop() {
                match catch_unwind(AssertUnwindSafe(|| callback())) {
                    Ok(()) => report.callbacks_run += 1,
                    Err(_) => {
                        report.callback_failures += 1;
                        let err = CooldownError::CallbackPanicked {
                            domain: self.domain.as_str(),
                        };
                        tracing::warn!(error = %err, expiry = *bucket.key(), "callback failed");
                    }
                }
            }
        }

        self.buckets_drained
            .fetch_add(report.buckets_drained as u64, Ordering::Relaxed);
        self.callback_failures
            .fetch_add(report.callback_failures as u64, Ordering::Relaxed);
        report
    }

    /// Earliest pending expiry.
    pub fn next_due(&self) -> Option<u64> {
        self.buckets.front().map(|bucket| *bucket.key())
    }

    /// Number of pending buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of queued callbacks across all pending buckets.
    pub fn pending_callbacks(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.value().len()).sum()
    }

    /// Check if no buckets are pending.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total callbacks ever scheduled.
    pub fn total_scheduled(&self) -> u64 {
        self.scheduled.load(Ordering::Relaxed)
    }

    /// Total buckets ever drained.
    pub fn total_buckets_drained(&self) -> u64 {
        self.buckets_drained.load(Ordering::Relaxed)
    }

    /// Total callback panics caught.
    pub fn total_callback_failures(&self) -> u64 {
        self.callback_failures.load(Ordering::Relaxed)
    }

    /// Drop every pending bucket without running it.
    pub fn clear(&self) {
        self.buckets.clear();
    }
}

impl std::fmt::Debug for ExpiryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiryIndex")
            .field("domain", &self.domain)
            .field("buckets", &self.bucket_count())
            .field("scheduled", &self.total_scheduled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn counter_callback(counter: &Arc<AtomicUsize>) -> RemovalCallback {
        let counter = Arc::clone(counter);
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_schedule_creates_one_bucket_per_expiry() {
        let index = ExpiryIndex::new(ExpiryDomain::SpellTicks);
        let hits = Arc::new(AtomicUsize::new(0));

        index.schedule(100, counter_callback(&hits));
        index.schedule(100, counter_callback(&hits));
        index.schedule(200, counter_callback(&hits));

        assert_eq!(index.bucket_count(), 2);
        assert_eq!(index.pending_callbacks(), 3);
        assert_eq!(index.next_due(), Some(100));
        assert_eq!(index.total_scheduled(), 3);
    }

    #[test]
    fn test_drain_stops_at_future_bucket() {
        let index = ExpiryIndex::new(ExpiryDomain::SpellTicks);
        let hits = Arc::new(AtomicUsize::new(0));

        index.schedule(10, counter_callback(&hits));
        index.schedule(20, counter_callback(&hits));
        index.schedule(30, counter_callback(&hits));

        let report = index.drain_due(20);
        assert_eq!(report.buckets_drained, 2);
        assert_eq!(report.callbacks_run, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(index.bucket_count(), 1);
        assert_eq!(index.next_due(), Some(30));
    }

    #[test]
    fn test_drain_runs_buckets_in_time_order() {
        let index = ExpiryIndex::new(ExpiryDomain::ActorCommandMillis);
        let order = Arc::new(Mutex::new(Vec::new()));

        for expiry in [30u64, 10, 20] {
            let order = Arc::clone(&order);
            index.schedule(expiry, Arc::new(move || order.lock().push(expiry)));
        }

        index.drain_due(100);
        assert_eq!(*order.lock(), vec![10, 20, 30]);
        assert!(index.is_empty());
    }

    #[test]
    fn test_panicking_callback_is_isolated() {
        let index = ExpiryIndex::new(ExpiryDomain::GlobalCommandMillis);
        let hits = Arc::new(AtomicUsize::new(0));

        index.schedule(5, counter_callback(&hits));
        index.schedule(5, Arc::new(|| panic!("callback failure")));
        index.schedule(5, counter_callback(&hits));
        index.schedule(6, counter_callback(&hits));

        let report = index.drain_due(10);
        assert_eq!(report.buckets_drained, 2);
        assert_eq!(report.callbacks_run, 3);
        assert_eq!(report.callback_failures, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(index.total_callback_failures(), 1);
    }

    #[test]
    fn test_second_drain_is_empty() {
        let index = ExpiryIndex::new(ExpiryDomain::SpellTicks);
        let hits = Arc::new(AtomicUsize::new(0));
        index.schedule(1, counter_callback(&hits));

        assert_eq!(index.drain_due(1).buckets_drained, 1);
        let again = index.drain_due(1);
        assert_eq!(again.buckets_drained, 0);
        assert_eq!(again.callbacks_run, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(index.total_buckets_drained(), 1);
    }

    #[test]
    fn test_schedule_into_past_is_picked_up_next_drain() {
        let index = ExpiryIndex::new(ExpiryDomain::SpellTicks);
        let hits = Arc::new(AtomicUsize::new(0));

        index.drain_due(50);
        index.schedule(40, counter_callback(&hits));
        assert_eq!(index.drain_due(50).callbacks_run, 1);
    }

    #[test]
    fn test_clear_drops_without_running() {
        let index = ExpiryIndex::new(ExpiryDomain::SpellTicks);
        let hits = Arc::new(AtomicUsize::new(0));
        index.schedule(1, counter_callback(&hits));
        index.clear();
        index.drain_due(u64::MAX);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
