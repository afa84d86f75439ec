// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A process-wide map from a user-supplied key to a reentrant mutex,
//! with reference-counted lifetime.
//!
//! `lock(key)` creates the mutex on first use and increments a
//! refcount; `unlock(key)` releases and, once the refcount hits zero,
//! removes the map entry so the key set never grows without bound.
//! The map mutation itself is guarded by a `dashmap` shard lock (the
//! same sharded-map idiom used for shared mutable registries
//! elsewhere in the corpus), so a create racing a destroy can never
//! leak an entry or double-remove one.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

struct Entry {
    mutex: Arc<Mutex<()>>,
    refcount: AtomicUsize,
}

/// A process-wide, reference-counted, keyed lock registry.
///
/// `tokio::sync::Mutex` is used for the per-key lock (rather than a
/// plain `std` mutex) because a holder may `.await` across user method
/// invocations while holding it; `tokio::sync::Mutex` queues waiters
/// FIFO, giving the fairness the engine's scheduling model requires
/// throughout.
#[derive(Default)]
pub struct KeyedLockManager<K> {
    entries: DashMap<K, Entry>,
}

impl<K> KeyedLockManager<K>
where
    K: std::hash::Hash + Eq + Clone,
{
    /// Creates an empty lock manager.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    fn acquire_handle(&self, key: &K) -> Arc<Mutex<()>> {
        let mut entry = self.entries.entry(key.clone()).or_insert_with(|| Entry {
            mutex: Arc::new(Mutex::new(())),
            refcount: AtomicUsize::new(0),
        });
        entry.refcount.fetch_add(1, Ordering::AcqRel);
        entry.mutex.clone()
    }

    fn release_handle(&self, key: &K) {
        if let Some(entry) = self.entries.get(key) {
            if entry.refcount.fetch_sub(1, Ordering::AcqRel) == 1 {
                drop(entry);
                // Re-check under the shard's write path: another
                // acquire may have bumped the refcount back up between
                // our fetch_sub and this removal attempt.
                self.entries.remove_if(key, |_, e| e.refcount.load(Ordering::Acquire) == 0);
            }
        }
    }

    /// Acquires the lock for `key`, blocking until available. Returns
    /// a guard that, when dropped, releases the lock and decrements
    /// the key's refcount.
    pub async fn lock(&self, key: K) -> KeyedLockGuard<'_, K> {
        let mutex = self.acquire_handle(&key);
        let guard = mutex.lock_owned().await;
        KeyedLockGuard {
            manager: self,
            key,
            guard: Some(guard),
        }
    }

    /// Attempts to acquire the lock for `key` without waiting.
    pub fn try_lock(&self, key: K) -> Option<KeyedLockGuard<'_, K>> {
        let mutex = self.acquire_handle(&key);
        match mutex.try_lock_owned() {
            Ok(guard) => Some(KeyedLockGuard {
                manager: self,
                key,
                guard: Some(guard),
            }),
            Err(_) => {
                self.release_handle(&key);
                None
            }
        }
    }

    /// Attempts to acquire the lock for `key`, waiting up to `timeout`.
    pub async fn try_lock_timeout(&self, key: K, timeout: Duration) -> Option<KeyedLockGuard<'_, K>> {
        let mutex = self.acquire_handle(&key);
        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => Some(KeyedLockGuard {
                manager: self,
                key,
                guard: Some(guard),
            }),
            Err(_) => {
                self.release_handle(&key);
                None
            }
        }
    }

    /// `true` if no entry exists for `key`. Used by tests to assert
    /// the map never leaks entries once every lock/unlock pair has
    /// balanced out.
    #[cfg(test)]
    fn is_vacant(&self, key: &K) -> bool {
        !self.entries.contains_key(key)
    }
}

/// An acquired keyed lock. Dropping the guard releases the mutex and
/// decrements the key's refcount, evicting the map entry if it hits
/// zero.
pub struct KeyedLockGuard<'a, K: std::hash::Hash + Eq + Clone> {
    manager: &'a KeyedLockManager<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: std::hash::Hash + Eq + Clone> Drop for KeyedLockGuard<'_, K> {
    fn drop(&mut self) {
        self.guard.take();
        self.manager.release_handle(&self.key);
    }
}
