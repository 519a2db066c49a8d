//! Per-(actor, resource) enforcement overrides.
//!
//! An override is a non-expiring marker that makes every cooldown query for
//! that actor and resource report "not on cooldown". Resources are keyed by
//! a derived [`Fingerprint`] so that two structurally identical resources
//! (same kind, same label) share one override.
//!
//! Both the fingerprint cache and the override set are bounded by bulk
//! clearing rather than per-entry recency. Clearing the cache costs one
//! recomputation per resource; clearing the override set re-enables
//! enforcement until the caller sets the override again. Neither can cause
//! an override to be reported where none was set.

use crate::cooldown::ActorKey;
use dashmap::{DashMap, DashSet};
use std::borrow::Cow;
use std::fmt;
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Seed for label hashing. Changing it invalidates every fingerprint.
const LABEL_HASH_SEED: u64 = 0;

/// Descriptive accessor for anything an override can target.
pub trait ResourceDescriptor {
    /// Resource kind (for example an item material).
    fn kind(&self) -> &str;

    /// Display label, if the resource has one.
    fn label(&self) -> Option<&str>;

    /// Raw identity used as the fingerprint cache key.
    fn identity(&self) -> Cow<'_, str> {
        match self.label() {
            Some(label) => Cow::Owned(format!("{}\u{0}{}", self.kind(), label)),
            None => Cow::Borrowed(self.kind()),
        }
    }
}

/// Plain owned resource description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    /// Resource kind.
    pub kind: String,
    /// Optional display label.
    pub label: Option<String>,
}

impl Resource {
    /// Create a resource with a label.
    pub fn new(kind: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            label: Some(label.into()),
        }
    }

    /// Create a resource with no label.
    pub fn unlabeled(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            label: None,
        }
    }
}

impl ResourceDescriptor for Resource {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// Stable derived identity of a resource.
///
/// Format: `{kind}:{label-part}` where the label part is `default` for an
/// unlabeled resource, `empty` for an empty label, and the 16-digit hex
/// xxHash64 of the label otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Derive the fingerprint for `resource`.
    pub fn of(resource: &dyn ResourceDescriptor) -> Self {
        let label_part = match resource.label() {
            None => Cow::Borrowed("default"),
            Some("") => Cow::Borrowed("empty"),
            Some(label) => Cow::Owned(format!("{:016x}", hash_label(label))),
        };
        Self(format!("{}:{}", resource.kind(), label_part))
    }

    /// The fingerprint as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn hash_label(label: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(LABEL_HASH_SEED);
    hasher.write(label.as_bytes());
    hasher.finish()
}

/// Bounded `identity → fingerprint` cache.
#[derive(Debug)]
pub struct FingerprintCache {
    entries: DashMap<String, Fingerprint>,
    max_entries: usize,
}

impl FingerprintCache {
    /// Create a cache holding at most `max_entries` fingerprints.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Fingerprint for `resource`, computing and caching it on a miss.
    ///
    /// A full cache still returns the fingerprint; it just stops caching
    /// until the next cap enforcement clears it.
    pub fn fingerprint(&self, resource: &dyn ResourceDescriptor) -> Fingerprint {
        let identity = resource.identity();
        if let Some(cached) = self.entries.get(identity.as_ref()) {
            return cached.clone();
        }

        let fingerprint = Fingerprint::of(resource);
        if self.entries.len() < self.max_entries {
            self.entries
                .insert(identity.into_owned(), fingerprint.clone());
        }
        fingerprint
    }

    /// Clear the cache if it has reached its cap. Returns the number of
    /// entries dropped.
    pub fn enforce_cap(&self) -> usize {
        let len = self.entries.len();
        if len >= self.max_entries {
            self.entries.clear();
            len
        } else {
            0
        }
    }

    /// Number of cached fingerprints.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured cap.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Drop every cached fingerprint.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// What a cap enforcement pass cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapReport {
    /// Fingerprint cache entries dropped.
    pub cache_cleared: usize,
    /// Override entries dropped.
    pub overrides_cleared: usize,
}

/// Concurrent set of active `(actor, fingerprint)` overrides.
#[derive(Debug)]
pub struct OverrideRegistry<A: ActorKey> {
    entries: DashSet<(A, Fingerprint)>,
    cache: FingerprintCache,
    max_overrides: usize,
}

impl<A: ActorKey> OverrideRegistry<A> {
    /// Create a registry with the given cache and set caps.
    pub fn new(fingerprint_cache_max: usize, override_set_max: usize) -> Self {
        Self {
            entries: DashSet::new(),
            cache: FingerprintCache::new(fingerprint_cache_max),
            max_overrides: override_set_max.max(1),
        }
    }

    /// Enable (`disabled == true`) or remove the override for `(actor, resource)`.
    pub fn set_disabled(&self, actor: &A, resource: &dyn ResourceDescriptor, disabled: bool) {
        let key = (actor.clone(), self.cache.fingerprint(resource));
        if disabled {
            self.entries.insert(key);
        } else {
            self.entries.remove(&key);
        }
    }

    /// Check whether enforcement is suppressed for `(actor, resource)`.
    pub fn is_disabled(&self, actor: &A, resource: &dyn ResourceDescriptor) -> bool {
        // Skip fingerprinting entirely in the common no-override case.
        if self.entries.is_empty() {
            return false;
        }
        let key = (actor.clone(), self.cache.fingerprint(resource));
        self.entries.contains(&key)
    }

    /// Remove every override held by `actor`. Returns how many were dropped.
    pub fn clear_actor(&self, actor: &A) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(owner, _)| owner != actor);
        before.saturating_sub(self.entries.len())
    }

    /// Bulk-clear the cache and the override set when over their caps.
    pub fn enforce_caps(&self) -> CapReport {
        let cache_cleared = self.cache.enforce_cap();
        let len = self.entries.len();
        let overrides_cleared = if len > self.max_overrides {
            self.entries.clear();
            len
        } else {
            0
        };
        CapReport {
            cache_cleared,
            overrides_cleared,
        }
    }

    /// Number of active overrides.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no overrides are active.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The fingerprint cache.
    pub fn cache(&self) -> &FingerprintCache {
        &self.cache
    }

    /// Drop every override and cached fingerprint.
    pub fn clear(&self) {
        self.entries.clear();
        self.cache.clear();
    }
}
