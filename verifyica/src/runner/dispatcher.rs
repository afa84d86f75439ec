// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The top-level scheduler: submits class jobs, bounds how many run
//! concurrently, and propagates cooperative shutdown.
//!
//! A run mixes distinct, monomorphic `ClassDescriptor<I>` trees (one
//! `I` per registered test class). [`ClassJob`] erases that type so
//! the dispatcher can hold a single `Vec` of heterogeneous class jobs
//! and drive them through one `Semaphore`-gated loop.

use crate::context::EngineContext;
use crate::descriptor::ClassDescriptor;
use crate::interceptor::Interceptor;
use crate::introspect::TestClassIntrospector;
use crate::listener::ExecutionListener;
use crate::runner::class_machine::{run_class, ClassRunResult};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};
use tracing::debug;
use verifyica_model::{RunSummary, UniqueId};

/// Cooperative cancellation shared between the dispatcher and every
/// running class job.
///
/// Checked between classes (and, inside a class, between arguments);
/// a class or argument already in flight is allowed to finish rather
/// than aborted mid-invocation, since a user lifecycle method has no
/// safe interruption point.
#[derive(Clone, Default)]
pub struct ShutdownToken {
    requested: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownToken {
    /// Creates a token in the not-yet-requested state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown; wakes anything waiting on
    /// [`ShutdownToken::cancelled`].
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// `true` if shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Resolves once shutdown has been requested.
    pub async fn cancelled(&self) {
        // Register for notification before checking the flag: `Notify`
        // guarantees a `notify_waiters` call occurring any time after
        // this future is created will wake it, so this ordering can't
        // miss a concurrent `request()`.
        let notified = self.notify.notified();
        if self.is_requested() {
            return;
        }
        notified.await;
    }
}

/// A type-erased unit of class-level work: everything needed to run
/// one `ClassDescriptor<I>` subtree, for a concrete `I` the dispatcher
/// no longer needs to name.
///
/// A run typically registers several distinct test classes, each with
/// its own introspector type; [`class_job`] is how a host turns one
/// resolved `ClassDescriptor<I>` into the common currency
/// [`TestRunner::execute`] accepts.
#[async_trait]
pub trait ClassJob: Send {
    #[doc(hidden)]
    async fn run(self: Box<Self>, engine_context: EngineContext, listener: Arc<dyn ExecutionListener>) -> ClassRunResult;
}

struct ClassJobImpl<I: TestClassIntrospector> {
    introspector: Arc<I>,
    descriptor: ClassDescriptor<I>,
    interceptors: Vec<Arc<dyn Interceptor<I::Instance, I::Argument>>>,
}

#[async_trait]
impl<I: TestClassIntrospector> ClassJob for ClassJobImpl<I> {
    async fn run(self: Box<Self>, engine_context: EngineContext, listener: Arc<dyn ExecutionListener>) -> ClassRunResult {
        run_class(self.introspector, engine_context, self.descriptor, self.interceptors, listener).await
    }
}

/// Builds a type-erased [`ClassJob`] from one resolved class subtree.
pub fn class_job<I: TestClassIntrospector>(
    introspector: Arc<I>,
    descriptor: ClassDescriptor<I>,
    interceptors: Vec<Arc<dyn Interceptor<I::Instance, I::Argument>>>,
) -> Box<dyn ClassJob> {
    Box::new(ClassJobImpl {
        introspector,
        descriptor,
        interceptors,
    })
}

/// Drives a full run: every submitted class job, bounded to
/// `class_parallelism` running concurrently, reporting through a
/// shared [`ExecutionListener`] and accumulating a [`RunSummary`].
pub struct TestRunner {
    engine_context: EngineContext,
    class_parallelism: usize,
    shutdown: ShutdownToken,
}

impl TestRunner {
    /// Creates a new runner over `engine_context`, bounding concurrent
    /// class execution to `class_parallelism`.
    pub fn new(engine_context: EngineContext, class_parallelism: usize) -> Self {
        Self {
            engine_context,
            class_parallelism: class_parallelism.max(1),
            shutdown: ShutdownToken::new(),
        }
    }

    /// A handle that can request cooperative shutdown of this run from
    /// another task, independent of whether `execute` has started yet.
    pub fn shutdown_handle(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// Requests cooperative shutdown: classes not yet submitted are
    /// dropped, already-running classes are allowed to finish. Safe to
    /// call from the same task driving `execute`, e.g. in response to
    /// a host-level abort request.
    pub fn cancel(&self) {
        self.shutdown.request();
    }

    /// Runs every class job to completion (or until shutdown is
    /// requested between classes), emitting events through `listener`.
    ///
    /// Submission order is randomized first when `engine.test.class.shuffle`
    /// is configured `true` (spec. §4.1 step 5, §6).
    ///
    /// Returns each job's [`ClassRunResult`] for callers that want
    /// class-level detail; most callers instead wrap `listener` in a
    /// [`SummarizingListener`] and read its tallied [`RunSummary`]
    /// once this returns.
    pub async fn execute(
        &self,
        mut jobs: Vec<Box<dyn ClassJob>>,
        listener: Arc<dyn ExecutionListener>,
    ) -> Vec<ClassRunResult> {
        if self.engine_context.configuration(crate::config::KEY_CLASS_SHUFFLE) == Some("true") {
            jobs.shuffle(&mut rand::thread_rng());
            debug!("shuffled class submission order");
        }

        let semaphore = Arc::new(Semaphore::new(self.class_parallelism));
        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs {
            if self.shutdown.is_requested() {
                debug!("shutdown requested, not submitting remaining class jobs");
                break;
            }

            let semaphore = semaphore.clone();
            let engine_context = self.engine_context.clone();
            let listener = listener.clone();
            let shutdown = self.shutdown.clone();

            let handle = tokio::spawn(async move {
                let permit = tokio::select! {
                    permit = semaphore.acquire_owned() => permit.expect("semaphore never closed"),
                    _ = shutdown.cancelled() => return None,
                };
                let result = job.run(engine_context, listener).await;
                drop(permit);
                Some(result)
            });
            handles.push(handle);
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Some(class_result) = handle.await.expect("class task panicked") {
                results.push(class_result);
            }
        }
        results
    }
}

/// Wraps a host [`ExecutionListener`] so method-level `Finished`
/// events are also tallied into a [`RunSummary`].
pub struct SummarizingListener<L> {
    inner: L,
    summary: parking_lot::Mutex<RunSummary>,
}

impl<L: ExecutionListener> SummarizingListener<L> {
    /// Wraps `inner`, starting from an empty summary.
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            summary: parking_lot::Mutex::new(RunSummary::default()),
        }
    }

    /// A snapshot of the summary accumulated so far.
    pub fn summary(&self) -> RunSummary {
        self.summary.lock().clone()
    }
}

#[async_trait]
impl<L: ExecutionListener> ExecutionListener for SummarizingListener<L> {
    async fn on_event(&self, event: crate::listener::Event) {
        if let crate::listener::Event::Finished(id, result) = &event {
            if is_test_method(id) {
                self.summary.lock().record(result);
            }
        }
        self.inner.on_event(event).await;
    }
}

fn is_test_method(id: &UniqueId) -> bool {
    matches!(id.segments().last(), Some(verifyica_model::IdSegment::Method(_)))
}
