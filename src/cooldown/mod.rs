//! Cooldown engine.
//!
//! Maps (actor, action) pairs to expiry times in two independent time
//! domains and reclaims expired entries through time-bucketed indices:
//! - [`store`] - Actor-keyed expiry storage and the global command map
//! - [`expiry`] - Time-bucketed removal index, one per domain
//! - [`overrides`] - Per-(actor, resource) enforcement overrides
//! - [`scheduler`] - Periodic cleanup pass and the scheduling facility
//! - [`manager`] - Public facade combining the above

pub mod expiry;
pub mod manager;
pub mod overrides;
pub mod scheduler;
pub mod store;

use std::fmt;
use std::hash::Hash;

/// Identity of the entity a cooldown applies to.
///
/// Any cheap-to-clone type with stable equality and hashing qualifies
/// (a UUID, a numeric id, a player name).
pub trait ActorKey: Eq + Hash + Clone + Send + Sync + fmt::Display + 'static {}

impl<T> ActorKey for T where T: Eq + Hash + Clone + Send + Sync + fmt::Display + 'static {}

/// Who is invoking a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller<A> {
    /// An addressable actor; cooldowns are tracked per actor.
    Actor(A),
    /// A non-actor invoker such as the console; cooldowns are shared.
    Console,
}

impl<A> Caller<A> {
    /// The actor, if any.
    pub fn actor(&self) -> Option<&A> {
        match self {
            Self::Actor(actor) => Some(actor),
            Self::Console => None,
        }
    }
}

impl<A: fmt::Display> fmt::Display for Caller<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Actor(actor) => write!(f, "{}", actor),
            Self::Console => write!(f, "console"),
        }
    }
}

pub use expiry::{DrainReport, ExpiryDomain, ExpiryIndex, RemovalCallback};
pub use manager::{CooldownManager, CooldownManagerBuilder};
pub use overrides::{
    CapReport, Fingerprint, FingerprintCache, OverrideRegistry, Resource, ResourceDescriptor,
};
pub use scheduler::{
    CleanupReport, CleanupScheduler, ManualScheduler, NoopScheduler, PeriodicScheduler,
    PeriodicTask, ScheduledTask, TokioScheduler,
};
pub use store::{ActorKeyedStore, GlobalStore};
