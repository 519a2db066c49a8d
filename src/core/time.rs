//! Time domains for cooldown tracking.
//!
//! Two independent clocks drive expiry, and they are never compared:
//! - [`Tick`]: a discrete, caller-supplied simulation counter (spell cooldowns)
//! - [`EpochMillis`]: wall-clock milliseconds since the Unix epoch (command cooldowns)
//!
//! Tick-domain queries never sample a clock; the caller passes the current
//! tick. The background cleanup pass asks a [`TickSource`] for "now", and the
//! command path asks a [`MillisClock`]. Both traits have manual
//! implementations so tests can drive time deterministically.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A point on the tick timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tick(pub u64);

impl Tick {
    /// Create a tick with the given count.
    pub const fn new(ticks: u64) -> Self {
        Self(ticks)
    }

    /// The first tick.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Convert a signed caller value, rejecting negatives.
    pub const fn from_signed(ticks: i64) -> Option<Self> {
        if ticks < 0 {
            None
        } else {
            Some(Self(ticks as u64))
        }
    }

    /// Convert a signed caller value, clamping negatives to zero.
    pub const fn clamped(ticks: i64) -> Self {
        if ticks < 0 {
            Self(0)
        } else {
            Self(ticks as u64)
        }
    }

    /// Raw tick count.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Advance by `ticks`, saturating at `u64::MAX`.
    pub const fn add(self, ticks: u64) -> Self {
        Self(self.0.saturating_add(ticks))
    }

    /// Check if this tick is strictly before `deadline`.
    pub const fn is_before(self, deadline: Tick) -> bool {
        self.0 < deadline.0
    }

    /// Check if this tick is at or after `deadline`.
    pub const fn is_at_or_after(self, deadline: Tick) -> bool {
        self.0 >= deadline.0
    }

    /// Ticks until `deadline`, or 0 if it has passed.
    pub const fn ticks_until(self, deadline: Tick) -> u64 {
        deadline.0.saturating_sub(self.0)
    }
}

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tick({})", self.0)
    }
}

/// Wall-clock milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EpochMillis(pub u64);

impl EpochMillis {
    /// Create a timestamp from raw milliseconds.
    pub const fn new(ms: u64) -> Self {
        Self(ms)
    }

    /// Raw millisecond value.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Advance by `ms`, saturating.
    pub const fn add_ms(self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms))
    }

    /// Advance by whole seconds, saturating.
    pub const fn add_secs(self, secs: u64) -> Self {
        self.add_ms(secs.saturating_mul(1000))
    }

    /// Check if this instant is strictly before `deadline`.
    pub const fn is_before(self, deadline: EpochMillis) -> bool {
        self.0 < deadline.0
    }

    /// Milliseconds until `deadline`, or 0 if it has passed.
    pub const fn ms_until(self, deadline: EpochMillis) -> u64 {
        deadline.0.saturating_sub(self.0)
    }

    /// Whole seconds until `deadline`, rounded down.
    pub const fn whole_secs_until(self, deadline: EpochMillis) -> u64 {
        self.ms_until(deadline) / 1000
    }
}

impl std::fmt::Display for EpochMillis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

fn system_now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ============================================================================
// Millisecond clocks
// ============================================================================

/// Source of wall-clock time for the command cooldown domain.
pub trait MillisClock: Send + Sync {
    /// Current time.
    fn now(&self) -> EpochMillis;
}

/// The process wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl MillisClock for SystemClock {
    fn now(&self) -> EpochMillis {
        EpochMillis(system_now_ms())
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: EpochMillis) -> Self {
        Self {
            now_ms: AtomicU64::new(start.0),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: EpochMillis) {
        self.now_ms.store(now.0, Ordering::Release);
    }

    /// Move forward by `ms`.
    pub fn advance_ms(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::AcqRel);
    }

    /// Move forward by whole seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.advance_ms(secs.saturating_mul(1000));
    }
}

impl MillisClock for ManualClock {
    fn now(&self) -> EpochMillis {
        EpochMillis(self.now_ms.load(Ordering::Acquire))
    }
}

// ============================================================================
// Tick sources
// ============================================================================

/// Tick source type, reported in logs and selectable in config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickSourceType {
    /// Highest tick callers have passed in.
    #[default]
    Observed,
    /// Host advances the counter explicitly (game loop, tests).
    Manual,
    /// Derived from the wall clock at a fixed tick length.
    WallClock,
}

impl std::fmt::Display for TickSourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Observed => write!(f, "observed"),
            Self::Manual => write!(f, "manual"),
            Self::WallClock => write!(f, "wall_clock"),
        }
    }
}

/// Supplies "now" in the tick domain to the cleanup pass.
///
/// Query and set operations never consult this; callers pass their own tick.
pub trait TickSource: Send + Sync {
    /// Current tick.
    fn current_tick(&self) -> Tick;

    /// Kind of source.
    fn source_type(&self) -> TickSourceType;
}

/// Tick counter owned by the host.
#[derive(Debug, Default)]
pub struct ManualTickSource {
    ticks: AtomicU64,
}

impl ManualTickSource {
    /// Create a source starting at `start`.
    pub fn new(start: Tick) -> Self {
        Self {
            ticks: AtomicU64::new(start.0),
        }
    }

    /// Publish a new current tick.
    pub fn set(&self, tick: Tick) {
        self.ticks.store(tick.0, Ordering::Release);
    }

    /// Advance by `ticks`.
    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::AcqRel);
    }
}

impl TickSource for ManualTickSource {
    fn current_tick(&self) -> Tick {
        Tick(self.ticks.load(Ordering::Acquire))
    }

    fn source_type(&self) -> TickSourceType {
        TickSourceType::Manual
    }
}

/// Tick source fed by the ticks callers pass to queries.
///
/// Holds the highest `now` seen so far. It never runs ahead of the host's
/// own counter, so a cleanup pass against it cannot drain a live entry.
#[derive(Debug, Default)]
pub struct ObservedTickSource {
    highest: AtomicU64,
}

impl ObservedTickSource {
    /// Create a source that has seen nothing yet (tick 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a caller's current tick.
    pub fn observe(&self, tick: Tick) {
        self.highest.fetch_max(tick.0, Ordering::AcqRel);
    }
}

impl TickSource for ObservedTickSource {
    fn current_tick(&self) -> Tick {
        Tick(self.highest.load(Ordering::Acquire))
    }

    fn source_type(&self) -> TickSourceType {
        TickSourceType::Observed
    }
}

/// Tick source that divides wall-clock milliseconds by a fixed tick length.
///
/// Opt-in only: the host's tick counter must itself be epoch-ms / tick length,
/// otherwise the first cleanup pass drains every spell cooldown.
#[derive(Debug, Clone)]
pub struct WallClockTickSource {
    ms_per_tick: u64,
}

impl WallClockTickSource {
    /// Create a source with the given tick length. Zero is treated as 1.
    pub fn new(ms_per_tick: u64) -> Self {
        Self {
            ms_per_tick: ms_per_tick.max(1),
        }
    }

    /// Configured tick length.
    pub fn ms_per_tick(&self) -> u64 {
        self.ms_per_tick
    }
}

impl TickSource for WallClockTickSource {
    fn current_tick(&self) -> Tick {
        Tick(system_now_ms() / self.ms_per_tick)
    }

    fn source_type(&self) -> TickSourceType {
        TickSourceType::WallClock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_from_signed() {
        assert_eq!(Tick::from_signed(-1), None);
        assert_eq!(Tick::from_signed(0), Some(Tick(0)));
        assert_eq!(Tick::clamped(-40), Tick(0));
        assert_eq!(Tick::clamped(40), Tick(40));
    }

    #[test]
    fn test_tick_arithmetic() {
        let t = Tick::new(50);
        assert_eq!(t.ticks_until(Tick(100)), 50);
        assert_eq!(Tick(100).ticks_until(t), 0);
        assert!(t.is_before(Tick(51)));
        assert!(Tick(100).is_at_or_after(Tick(100)));
        assert_eq!(Tick(u64::MAX).add(1), Tick(u64::MAX));
    }

    #[test]
    fn test_epoch_millis_whole_secs() {
        let now = EpochMillis::new(1_000);
        assert_eq!(now.whole_secs_until(EpochMillis(11_000)), 10);
        assert_eq!(now.whole_secs_until(EpochMillis(10_999)), 9);
        assert_eq!(now.whole_secs_until(EpochMillis(500)), 0);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(EpochMillis(5_000));
        clock.advance_secs(10);
        assert_eq!(clock.now(), EpochMillis(15_000));
        clock.set(EpochMillis(1));
        assert_eq!(clock.now(), EpochMillis(1));
    }

    #[test]
    fn test_manual_tick_source() {
        let source = ManualTickSource::new(Tick(7));
        source.advance(3);
        assert_eq!(source.current_tick(), Tick(10));
        assert_eq!(source.source_type(), TickSourceType::Manual);
    }

    #[test]
    fn test_observed_tick_source_keeps_highest() {
        let source = ObservedTickSource::new();
        assert_eq!(source.current_tick(), Tick(0));
        source.observe(Tick(40));
        source.observe(Tick(12));
        assert_eq!(source.current_tick(), Tick(40));
        assert_eq!(source.source_type(), TickSourceType::Observed);
        assert_eq!(TickSourceType::default(), TickSourceType::Observed);
    }

    #[test]
    fn test_wall_clock_tick_source_zero_length() {
        let source = WallClockTickSource::new(0);
        assert_eq!(source.ms_per_tick(), 1);
        assert!(source.current_tick().get() > 0);
    }
}
