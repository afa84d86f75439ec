// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scoped key/value storage with auto-close semantics.
//!
//! [`Store`] backs the engine-, class-, and argument-scoped contexts.
//! Values that implement [`Closeable`] are closed in reverse insertion
//! order when the owning scope ends; [`Map`] is the same storage
//! shape without the close contract.

use crate::errors::CloseError;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A value that knows how to release resources it holds.
///
/// Implemented by payloads (arguments, store entries) that wrap a
/// resource the engine should clean up when the owning scope ends.
/// Downcasting to the concrete type follows the `as_any`/`as_any_mut`
/// pattern used elsewhere for type-erased trait objects, rather than
/// `Closeable: Any` directly, so implementors don't need to write
/// boilerplate `Any` forwarding methods themselves.
pub trait Closeable: Send {
    /// Releases the resource. Called at most once.
    fn close(&mut self) -> Result<(), CloseError>;

    /// Returns `self` as `&dyn Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns `self` as `&mut dyn Any` for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

enum Entry {
    Plain(Box<dyn Any + Send>),
    Closeable(Box<dyn Closeable>),
}

impl Entry {
    fn as_any(&self) -> &dyn Any {
        match self {
            Entry::Plain(v) => v.as_ref(),
            Entry::Closeable(v) => v.as_any(),
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        match self {
            Entry::Plain(v) => v.as_mut(),
            Entry::Closeable(v) => v.as_any_mut(),
        }
    }
}

/// An insertion-ordered key/value store, scoped to an engine, class,
/// or argument context.
///
/// Reads and writes are internally synchronized so concurrent argument
/// workers may share a [`Store`] (e.g. the class-scoped one) safely.
/// `compute_if_absent` is atomic with respect to a given key: the
/// factory runs at most once per key even under concurrent callers.
pub struct Store {
    entries: Mutex<IndexMap<String, Entry>>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("Store")
            .field("keys", &entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
        }
    }

    /// Inserts a plain (non-closeable) value, returning the previous
    /// value under `key` if one existed and was of type `T`.
    pub fn put<T: Send + 'static>(&self, key: impl Into<String>, value: T) {
        self.entries
            .lock()
            .insert(key.into(), Entry::Plain(Box::new(value)));
    }

    /// Inserts a closeable value. It will be closed, along with the
    /// rest of the store, in reverse insertion order when the scope
    /// ends.
    pub fn put_closeable<T: Closeable + 'static>(&self, key: impl Into<String>, value: T) {
        self.entries
            .lock()
            .insert(key.into(), Entry::Closeable(Box::new(value)));
    }

    /// Returns a clone of the value under `key` if present and of type `T`.
    pub fn get_as<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.entries
            .lock()
            .get(key)
            .and_then(|e| e.as_any().downcast_ref::<T>())
            .cloned()
    }

    /// Returns `true` if `key` is present and holds a `T`.
    pub fn contains<T: 'static>(&self, key: &str) -> bool {
        self.entries
            .lock()
            .get(key)
            .is_some_and(|e| e.as_any().is::<T>())
    }

    /// Atomically returns the value under `key`, computing and
    /// inserting it via `factory` if absent. The factory runs with the
    /// store's internal lock held, so it must not re-enter the same
    /// store.
    pub fn compute_if_absent<T: Clone + Send + 'static>(
        &self,
        key: impl Into<String>,
        factory: impl FnOnce() -> T,
    ) -> T {
        let key = key.into();
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&key).and_then(|e| e.as_any().downcast_ref::<T>()) {
            return existing.clone();
        }
        let value = factory();
        entries.insert(key, Entry::Plain(Box::new(value.clone())));
        value
    }

    /// Removes and returns a plain (non-closeable) value under `key` if
    /// present and of type `T`.
    ///
    /// Closeable entries are not removable through this method: they
    /// stay store-owned until the scope's auto-close pass runs, so a
    /// caller can never accidentally bypass `close`.
    pub fn remove_as<T: 'static>(&self, key: &str) -> Option<Box<T>> {
        let mut entries = self.entries.lock();
        match entries.get(key)? {
            Entry::Plain(v) if v.is::<T>() => {}
            _ => return None,
        }
        let Entry::Plain(boxed_any) = entries.shift_remove(key)? else {
            unreachable!("checked above");
        };
        boxed_any.downcast::<T>().ok()
    }

    /// The keys currently stored, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// The number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// `true` if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Closes every closeable entry in reverse insertion order and
    /// clears the store, aggregating any throwables raised.
    ///
    /// Per the scoped auto-close contract, a throwable from one
    /// entry's `close` does not prevent the remaining entries (in
    /// reverse order) from being closed.
    pub fn close_all(&self) -> Vec<CloseError> {
        let mut entries = self.entries.lock();
        let mut errors = Vec::new();
        // IndexMap preserves insertion order; drain in reverse.
        while let Some((key, mut entry)) = entries.pop() {
            if let Entry::Closeable(closeable) = &mut entry {
                if let Err(e) = closeable.close() {
                    errors.push(CloseError::new(key, Box::new(e)));
                }
            }
        }
        errors
    }
}

/// A shared handle to a [`Store`], used where multiple contexts must
/// own a reference to the same underlying storage (e.g. a class
/// context shared by concurrent argument workers).
pub type SharedStore = Arc<Store>;

impl Store {
    /// A read-only projection of this store: only the read-side
    /// accessors are reachable through it, so a holder cannot insert,
    /// remove, or trigger `compute_if_absent`'s factory.
    pub fn read_only(&self) -> ReadOnlyStore<'_> {
        ReadOnlyStore { inner: self }
    }
}

/// A read-only view over a [`Store`], returned to code that must not
/// mutate a scope it doesn't own (e.g. the immutable argument context
/// view passed to `Test` invocations).
#[derive(Clone, Copy)]
pub struct ReadOnlyStore<'a> {
    inner: &'a Store,
}

impl ReadOnlyStore<'_> {
    /// Returns a clone of the value under `key` if present and of type `T`.
    pub fn get_as<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.inner.get_as(key)
    }

    /// Returns `true` if `key` is present and holds a `T`.
    pub fn contains<T: 'static>(&self, key: &str) -> bool {
        self.inner.contains::<T>(key)
    }

    /// The keys currently stored, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.keys()
    }

    /// The number of entries currently stored.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// `true` if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// An identical concept to [`Store`] without the auto-close contract:
/// a plain, insertion-ordered, internally synchronized key/value map.
#[derive(Default)]
pub struct Map {
    entries: Mutex<IndexMap<String, Box<dyn Any + Send>>>,
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("Map")
            .field("keys", &entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Map {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value under `key`.
    pub fn put<T: Send + 'static>(&self, key: impl Into<String>, value: T) {
        self.entries.lock().insert(key.into(), Box::new(value));
    }

    /// Returns a clone of the value under `key` if present and of type `T`.
    pub fn get_as<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.entries
            .lock()
            .get(key)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Removes and returns the value under `key` if present and of type `T`.
    pub fn remove_as<T: 'static>(&self, key: &str) -> Option<Box<T>> {
        let mut entries = self.entries.lock();
        let value = entries.shift_remove(key)?;
        value.downcast::<T>().ok()
    }

    /// The keys currently stored, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tracker {
        log: Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
    }

    impl Closeable for Tracker {
        fn close(&mut self) -> Result<(), CloseError> {
            self.log.lock().push(self.name);
            Ok(())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    struct FailingTracker {
        log: Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
    }

    impl Closeable for FailingTracker {
        fn close(&mut self) -> Result<(), CloseError> {
            self.log.lock().push(self.name);
            Err(CloseError::new(self.name, "boom".into()))
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn closes_in_reverse_insertion_order_even_if_one_fails() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let store = Store::new();
        store.put_closeable(
            "a",
            Tracker {
                log: log.clone(),
                name: "a",
            },
        );
        store.put_closeable(
            "b",
            FailingTracker {
                log: log.clone(),
                name: "b",
            },
        );
        store.put_closeable(
            "c",
            Tracker {
                log: log.clone(),
                name: "c",
            },
        );

        let errors = store.close_all();
        pretty_assertions::assert_eq!(*log.lock(), vec!["c", "b", "a"]);
        assert_eq!(errors.len(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn compute_if_absent_runs_factory_once() {
        let store = Store::new();
        let calls = Arc::new(Mutex::new(0));
        for _ in 0..3 {
            let calls = calls.clone();
            store.compute_if_absent("k", move || {
                *calls.lock() += 1;
                7
            });
        }
        assert_eq!(*calls.lock(), 1);
        assert_eq!(store.get_as::<i32>("k"), Some(7));
    }

    #[test]
    fn read_only_store_exposes_only_reads() {
        let store = Store::new();
        store.put("k", 7_i32);
        let view = store.read_only();
        assert_eq!(view.get_as::<i32>("k"), Some(7));
        assert!(view.contains::<i32>("k"));
        assert_eq!(view.keys(), vec!["k".to_string()]);
        assert_eq!(view.len(), 1);
        assert!(!view.is_empty());
        // `view` has no `put`/`compute_if_absent`/`remove_as`: only the
        // accessors above compile against `ReadOnlyStore`.
    }

    struct OwnedTracker {
        log: Arc<Mutex<Vec<String>>>,
        name: String,
        fails: bool,
    }

    impl Closeable for OwnedTracker {
        fn close(&mut self) -> Result<(), CloseError> {
            self.log.lock().push(self.name.clone());
            if self.fails {
                Err(CloseError::new(self.name.clone(), "boom".into()))
            } else {
                Ok(())
            }
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    proptest::proptest! {
        #[test]
        fn closes_always_in_reverse_insertion_order(outcomes in proptest::collection::vec(proptest::bool::ANY, 1..12)) {
            let log = Arc::new(Mutex::new(Vec::new()));
            let store = Store::new();
            let names: Vec<String> = (0..outcomes.len()).map(|i| format!("k{i}")).collect();
            for (name, &fails) in names.iter().zip(&outcomes) {
                store.put_closeable(
                    name.clone(),
                    OwnedTracker {
                        log: log.clone(),
                        name: name.clone(),
                        fails,
                    },
                );
            }

            let errors = store.close_all();

            let expected_order: Vec<String> = names.iter().rev().cloned().collect();
            proptest::prop_assert_eq!(log.lock().clone(), expected_order);
            proptest::prop_assert_eq!(errors.len(), outcomes.iter().filter(|f| **f).count());
            proptest::prop_assert!(store.is_empty());
        }
    }

    #[test]
    fn map_has_no_close_contract() {
        let map = Map::new();
        map.put("k", 1_i32);
        assert_eq!(map.get_as::<i32>("k"), Some(1));
        assert_eq!(map.remove_as::<i32>("k").map(|b| *b), Some(1));
        assert!(map.get_as::<i32>("k").is_none());
    }
}
