//! Hourglass - per-actor, dual-time-domain cooldown engine.
//!
//! Hourglass tracks when a named action may next be performed by a given
//! actor. Two action classes use two independent clocks: spells expire on a
//! caller-supplied tick counter, commands on wall-clock milliseconds. Expired
//! entries are reclaimed by a periodic pass over time-bucketed indices, so
//! cleanup cost follows the number of due expiry times rather than the
//! number of live entries.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        CooldownManager                          │
//! │   spells (ticks) │ commands (ms) │ console commands │ overrides │
//! └─────────────────────────────────────────────────────────────────┘
//!          │ set: store + schedule          │ query: override → store
//! ┌─────────────────────────────────┐ ┌───────────────────────────┐
//! │ ActorKeyedStore / GlobalStore   │ │ OverrideRegistry          │
//! │ actor → key → expiry            │ │ (actor, fingerprint) set  │
//! └─────────────────────────────────┘ └───────────────────────────┘
//!          ▲ compare-and-remove
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ ExpiryIndex × 3: expiry → [removal callbacks]                   │
//! └─────────────────────────────────────────────────────────────────┘
//!          ▲ drain_due(now) every interval
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ CleanupScheduler on a PeriodicScheduler (tokio, manual, none)   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Process runtime for the binary
//! - [`core::time`] - Tick and wall-clock time domains
//! - [`core::error`] - Error types
//!
//! ## Cooldown engine
//! - [`cooldown::store`] - Actor-keyed expiry storage
//! - [`cooldown::expiry`] - Time-bucketed removal index
//! - [`cooldown::overrides`] - Enforcement overrides and fingerprints
//! - [`cooldown::scheduler`] - Cleanup pass and periodic scheduling
//! - [`cooldown::manager`] - Public facade
//!
//! ## Operations
//! - [`ops::observability`] - Metrics and snapshots
//!
//! ## CLI
//! - [`cli::commands`] - CLI command implementations
//!
//! # Key Invariants
//!
//! - At most one expiry exists per (actor, key); the last write wins
//! - A removal callback only removes an entry whose expiry still matches
//! - An actor with no remaining entries has no outer map entry
//! - Buckets drain in non-decreasing time order and are never reinserted

pub mod cli;
pub mod cooldown;
pub mod core;
pub mod ops;

pub use cooldown::{Caller, CooldownManager, CooldownManagerBuilder, Resource, ResourceDescriptor};
pub use core::config::Config;
pub use core::error::{CooldownError, CooldownResult};
pub use core::time::{EpochMillis, Tick};
pub use ops::observability::MetricsSnapshot;
