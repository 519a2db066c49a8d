//! Actor-keyed expiry storage.
//!
//! `actor → (action key → expiry)` as a sharded concurrent outer map whose
//! values are per-actor inner maps. Every compound operation (insert-if-absent,
//! compare-and-remove, check-and-start, reclaim-empty-actor) runs inside one
//! outer entry guard, so an actor's inner map can never be detached while a
//! concurrent writer is inserting into it.
//!
//! Expiry values are raw `u64`s; the store does not know which time domain
//! it holds. Absence is a normal return, never an error.

use crate::cooldown::ActorKey;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;

/// Concurrent `actor → key → expiry` map.
#[derive(Debug)]
pub struct ActorKeyedStore<A: ActorKey> {
    actors: DashMap<A, HashMap<String, u64>>,
}

impl<A: ActorKey> ActorKeyedStore<A> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            actors: DashMap::new(),
        }
    }

    /// Current expiry for `(actor, key)`.
    pub fn get(&self, actor: &A, key: &str) -> Option<u64> {
        self.actors
            .get(actor)
            .and_then(|inner| inner.get(key).copied())
    }

    /// Set the expiry for `(actor, key)`, returning the previous value.
    ///
    /// Last write wins.
    pub fn set(&self, actor: A, key: String, expiry: u64) -> Option<u64> {
        self.actors.entry(actor).or_default().insert(key, expiry)
    }

    /// Start a cooldown unless one is still running at `now`.
    ///
    /// Returns `Err(existing_expiry)` when `now < existing_expiry`; otherwise
    /// stores `until` and returns `Ok(())`. The check and the write are one
    /// atomic step.
    pub fn try_start(&self, actor: A, key: &str, now: u64, until: u64) -> Result<(), u64> {
        let mut inner = self.actors.entry(actor).or_default();
        if let Some(&existing) = inner.get(key) {
            if now < existing {
                return Err(existing);
            }
        }
        inner.insert(key.to_string(), until);
        Ok(())
    }

    /// Remove `(actor, key)` unconditionally.
    pub fn remove(&self, actor: &A, key: &str) -> Option<u64> {
        self.remove_where(actor, key, |_| true)
    }

    /// Remove `(actor, key)` only if its expiry still equals `expected`.
    ///
    /// Returns true if an entry was removed.
    pub fn remove_if_eq(&self, actor: &A, key: &str, expected: u64) -> bool {
        self.remove_where(actor, key, |current| current == expected)
            .is_some()
    }

    fn remove_where(&self, actor: &A, key: &str, pred: impl FnOnce(u64) -> bool) -> Option<u64> {
        // Cheap miss path without taking the shard write lock.
        if self.get(actor, key).is_none() {
            return None;
        }

        match self.actors.entry(actor.clone()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get().get(key).copied()?;
                if !pred(current) {
                    return None;
                }
                occupied.get_mut().remove(key);
                if occupied.get().is_empty() {
                    occupied.remove();
                }
                Some(current)
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Remove every entry for `actor`, returning how many were dropped.
    pub fn clear_actor(&self, actor: &A) -> usize {
        self.actors
            .remove(actor)
            .map(|(_, inner)| inner.len())
            .unwrap_or(0)
    }

    /// Check whether `actor` has any entries.
    pub fn contains_actor(&self, actor: &A) -> bool {
        self.actors.contains_key(actor)
    }

    /// Number of actors with at least one entry.
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// Total entries across all actors.
    ///
    /// Walks every actor; intended for metrics, not the hot path.
    pub fn entry_count(&self) -> usize {
        self.actors.iter().map(|inner| inner.len()).sum()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.actors.clear();
    }
}

impl<A: ActorKey> Default for ActorKeyedStore<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Concurrent `key → expiry` map for callers with no actor identity.
#[derive(Debug, Default)]
pub struct GlobalStore {
    entries: DashMap<String, u64>,
}

impl GlobalStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current expiry for `key`.
    pub fn get(&self, key: &str) -> Option<u64> {
        self.entries.get(key).map(|v| *v)
    }

    /// Set the expiry for `key`, returning the previous value.
    pub fn set(&self, key: String, expiry: u64) -> Option<u64> {
        self.entries.insert(key, expiry)
    }

    /// Atomic check-and-start; see [`ActorKeyedStore::try_start`].
    pub fn try_start(&self, key: &str, now: u64, until: u64) -> Result<(), u64> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let existing = *occupied.get();
                if now < existing {
                    return Err(existing);
                }
                occupied.insert(until);
                Ok(())
            }
            Entry::Vacant(vacant) => {
                vacant.insert(until);
                Ok(())
            }
        }
    }

    /// Remove `key` unconditionally.
    pub fn remove(&self, key: &str) -> Option<u64> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    /// Remove `key` only if its expiry still equals `expected`.
    pub fn remove_if_eq(&self, key: &str, expected: u64) -> bool {
        self.entries
            .remove_if(key, |_, current| *current == expected)
            .is_some()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_last_write_wins() {
        let store: ActorKeyedStore<u64> = ActorKeyedStore::new();
        assert_eq!(store.set(1, "fireball".into(), 100), None);
        assert_eq!(store.set(1, "fireball".into(), 200), Some(100));
        assert_eq!(store.get(&1, "fireball"), Some(200));
        assert_eq!(store.get(&1, "frost"), None);
        assert_eq!(store.get(&2, "fireball"), None);
    }

    #[test]
    fn test_remove_reclaims_empty_actor() {
        let store: ActorKeyedStore<u64> = ActorKeyedStore::new();
        store.set(1, "a".into(), 10);
        store.set(1, "b".into(), 20);

        assert_eq!(store.remove(&1, "a"), Some(10));
        assert!(store.contains_actor(&1));
        assert_eq!(store.remove(&1, "b"), Some(20));
        assert!(!store.contains_actor(&1));
        assert_eq!(store.actor_count(), 0);
    }

    #[test]
    fn test_remove_if_eq_ignores_refreshed_entry() {
        let store: ActorKeyedStore<u64> = ActorKeyedStore::new();
        store.set(1, "a".into(), 10);
        store.set(1, "a".into(), 30);

        assert!(!store.remove_if_eq(&1, "a", 10));
        assert_eq!(store.get(&1, "a"), Some(30));
        assert!(store.remove_if_eq(&1, "a", 30));
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let store: ActorKeyedStore<u64> = ActorKeyedStore::new();
        assert_eq!(store.remove(&9, "x"), None);
        assert!(!store.remove_if_eq(&9, "x", 1));
    }

    #[test]
    fn test_try_start() {
        let store: ActorKeyedStore<u64> = ActorKeyedStore::new();
        assert_eq!(store.try_start(1, "heal", 0, 10_000), Ok(()));
        assert_eq!(store.try_start(1, "heal", 5_000, 15_000), Err(10_000));
        assert_eq!(store.try_start(1, "heal", 10_000, 20_000), Ok(()));
        assert_eq!(store.get(&1, "heal"), Some(20_000));
    }

    #[test]
    fn test_counts_and_clear_actor() {
        let store: ActorKeyedStore<u64> = ActorKeyedStore::new();
        store.set(1, "a".into(), 1);
        store.set(1, "b".into(), 2);
        store.set(2, "a".into(), 3);
        assert_eq!(store.actor_count(), 2);
        assert_eq!(store.entry_count(), 3);

        assert_eq!(store.clear_actor(&1), 2);
        assert_eq!(store.clear_actor(&1), 0);
        assert_eq!(store.entry_count(), 1);
    }

    #[test]
    fn test_global_store() {
        let store = GlobalStore::new();
        assert_eq!(store.try_start("reload.reload", 0, 5_000), Ok(()));
        assert_eq!(store.try_start("reload.reload", 1_000, 6_000), Err(5_000));
        assert!(!store.remove_if_eq("reload.reload", 1));
        assert!(store.remove_if_eq("reload.reload", 5_000));
        assert!(store.is_empty());
    }
}
