// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The context hierarchy: `EngineContext` → `ClassContext` → `ArgumentContext`.
//!
//! Ownership follows the longest-lived holder: the engine context
//! outlives the whole run, a class context outlives its argument
//! subtrees, and an argument context is scoped to one argument's
//! lifecycle. Contexts are cheap, cloneable handles (`Arc` internally)
//! rather than borrowing references, so they can be captured into the
//! futures the scheduler spawns without lifetime gymnastics.

use crate::store::{Map, ReadOnlyStore, SharedStore, Store};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use verifyica_model::Argument;

/// Process-scoped context: configuration, and the one engine-level
/// store and map shared by the entire run.
#[derive(Clone)]
pub struct EngineContext {
    inner: Arc<EngineContextInner>,
}

struct EngineContextInner {
    configuration: HashMap<String, String>,
    store: SharedStore,
    map: Arc<Map>,
}

impl EngineContext {
    /// Creates a new engine context from a resolved configuration map.
    pub fn new(configuration: HashMap<String, String>) -> Self {
        Self {
            inner: Arc::new(EngineContextInner {
                configuration,
                store: Arc::new(Store::new()),
                map: Arc::new(Map::new()),
            }),
        }
    }

    /// Looks up a configuration value by key.
    pub fn configuration(&self, key: &str) -> Option<&str> {
        self.inner.configuration.get(key).map(String::as_str)
    }

    /// The engine-scoped store.
    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// The engine-scoped map.
    pub fn map(&self) -> &Map {
        &self.inner.map
    }

    /// Closes the engine-scoped store. Called once, after every class
    /// subtree has terminated.
    pub fn close(&self) -> Vec<crate::errors::CloseError> {
        self.inner.store.close_all()
    }
}

/// Context scoped to one class node for the duration of its whole
/// execution (`prepare` through `conclude` and every argument
/// subtree in between).
#[derive(Clone)]
pub struct ClassContext {
    inner: Arc<ClassContextInner>,
}

struct ClassContextInner {
    engine: EngineContext,
    test_class: String,
    argument_parallelism: usize,
    store: SharedStore,
    map: Arc<Map>,
    lock: Arc<RwLock<()>>,
}

impl ClassContext {
    /// Creates a new class context.
    pub fn new(engine: EngineContext, test_class: impl Into<String>, argument_parallelism: usize) -> Self {
        Self {
            inner: Arc::new(ClassContextInner {
                engine,
                test_class: test_class.into(),
                argument_parallelism,
                store: Arc::new(Store::new()),
                map: Arc::new(Map::new()),
                lock: Arc::new(RwLock::new(())),
            }),
        }
    }

    /// The parent engine context.
    pub fn engine(&self) -> &EngineContext {
        &self.inner.engine
    }

    /// The fully-qualified name of the test class this context belongs to.
    pub fn test_class(&self) -> &str {
        &self.inner.test_class
    }

    /// The resolved argument parallelism for this class (already
    /// clamped to the engine-wide ceiling).
    pub fn argument_parallelism(&self) -> usize {
        self.inner.argument_parallelism
    }

    /// The class-scoped store.
    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// The class-scoped map.
    pub fn map(&self) -> &Map {
        &self.inner.map
    }

    /// A reentrant-by-role read/write lock for user-level coordination
    /// across concurrent argument workers: readers may proceed
    /// concurrently, writers are exclusive.
    pub fn lock(&self) -> &RwLock<()> {
        &self.inner.lock
    }

    /// Closes the class-scoped store. Called once, after `conclude`.
    pub fn close(&self) -> Vec<crate::errors::CloseError> {
        self.inner.store.close_all()
    }
}

/// Context scoped to one argument node.
///
/// The engine passes a mutable view to `BeforeAll`/`AfterAll`/
/// `BeforeEach`/`AfterEach` invocations and an [`ImmutableArgumentContext`]
/// view to `Test` invocations, per the interceptor pipeline's contract
/// that test bodies cannot mutate argument-scoped state.
#[derive(Clone)]
pub struct ArgumentContext<T> {
    inner: Arc<ArgumentContextInner<T>>,
}

struct ArgumentContextInner<T> {
    class: ClassContext,
    argument_index: usize,
    // Guarded rather than held by plain reference: the per-argument
    // state machine's auto-close phase needs `&mut` access to the
    // payload, and an `ArgumentContext` is cheaply cloned/shared across
    // concurrent holders for the rest of the argument's lifecycle.
    argument: Mutex<Argument<T>>,
    store: SharedStore,
    map: Arc<Map>,
}

impl<T> ArgumentContext<T> {
    /// Creates a new argument context.
    pub fn new(class: ClassContext, argument_index: usize, argument: Argument<T>) -> Self {
        Self {
            inner: Arc::new(ArgumentContextInner {
                class,
                argument_index,
                argument: Mutex::new(argument),
                store: Arc::new(Store::new()),
                map: Arc::new(Map::new()),
            }),
        }
    }

    /// The parent class context.
    pub fn class(&self) -> &ClassContext {
        &self.inner.class
    }

    /// This argument's index within its class's argument list.
    pub fn argument_index(&self) -> usize {
        self.inner.argument_index
    }

    /// The argument itself. The returned guard derefs to `Argument<T>`,
    /// so both read access (`ctx.argument().payload()`) and, for the
    /// engine's own auto-close phase, `ctx.argument().payload_mut()`
    /// work through the same accessor.
    pub fn argument(&self) -> MutexGuard<'_, Argument<T>> {
        self.inner.argument.lock()
    }

    /// The argument-scoped store.
    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// The argument-scoped map.
    pub fn map(&self) -> &Map {
        &self.inner.map
    }

    /// Returns an immutable view suitable for passing to a `Test`
    /// invocation. Mutating methods on the returned view return
    /// `false`/no-op rather than panicking, matching the interceptor
    /// contract that a throwable, not a panic, is how user code learns
    /// it tried something disallowed.
    pub fn immutable_view(&self) -> ImmutableArgumentContext<T> {
        ImmutableArgumentContext { inner: self.clone() }
    }

    /// Closes the argument-scoped store. Called once, as part of the
    /// per-argument state machine's teardown path.
    pub fn close_store(&self) -> Vec<crate::errors::CloseError> {
        self.inner.store.close_all()
    }
}

/// An immutable view over an [`ArgumentContext`], passed to `Test`
/// method invocations.
///
/// Reads are delegated straight through; this type exists purely so
/// the type system documents, at the call site, that a `Test` method
/// received a read-only view and cannot reach the mutators
/// `BeforeAll`/`AfterAll`/`BeforeEach`/`AfterEach` receive.
#[derive(Clone)]
pub struct ImmutableArgumentContext<T> {
    inner: ArgumentContext<T>,
}

impl<T> ImmutableArgumentContext<T> {
    /// The parent class context.
    pub fn class(&self) -> &ClassContext {
        self.inner.class()
    }

    /// This argument's index within its class's argument list.
    pub fn argument_index(&self) -> usize {
        self.inner.argument_index()
    }

    /// The argument itself, read-only from this view's perspective in
    /// spirit (the lock is still technically exclusive, matching every
    /// other guarded accessor on this type).
    pub fn argument(&self) -> MutexGuard<'_, Argument<T>> {
        self.inner.argument()
    }

    /// The argument-scoped store, as a read-only projection:
    /// `put`/`compute_if_absent`/`remove_as` are not reachable through
    /// it, only reads.
    pub fn store(&self) -> ReadOnlyStore<'_> {
        self.inner.store().read_only()
    }

    /// The argument-scoped map, read-only from this view's perspective.
    pub fn map(&self) -> &Map {
        self.inner.map()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_context_shares_store_across_clones() {
        let engine = EngineContext::new(HashMap::new());
        let class = ClassContext::new(engine, "com.example.T", 2);
        class.store().put("k", 1_i32);
        let clone = class.clone();
        assert_eq!(clone.store().get_as::<i32>("k"), Some(1));
    }

    #[test]
    fn argument_context_exposes_immutable_view_with_same_data() {
        let engine = EngineContext::new(HashMap::new());
        let class = ClassContext::new(engine, "com.example.T", 1);
        let ctx = ArgumentContext::new(class, 0, Argument::new("x", 42));
        let view = ctx.immutable_view();
        assert_eq!(*view.argument().payload(), 42);
        assert_eq!(view.argument_index(), 0);
    }
}
