//! Per-key mutual exclusion
//!
//! Ledger mutations are serialized per wallet and window admissions per
//! agent. Different keys proceed fully in parallel; there is no global lock.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A registry of lazily created per-key async mutexes
pub struct KeyedLocks<K: Eq + Hash + Clone> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Acquire the lock for `key`, waiting if another task holds it
    ///
    /// The guard is owned, so it can be held across awaits within the
    /// critical section. Callers must not perform unbounded external I/O
    /// while holding it.
    pub async fn acquire(&self, key: &K) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}
