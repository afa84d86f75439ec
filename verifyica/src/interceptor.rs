// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The interceptor pipeline: every user-visible invocation is wrapped
//! with pre hooks (registration order), the body, then post hooks
//! (reverse order).
//!
//! A throwable from a *pre* hook aborts the body, but post hooks still
//! run. A throwable from a *post* hook is captured and appended to the
//! node's result throwables without preventing the remaining post
//! hooks from running.

use crate::context::{ArgumentContext, ClassContext, ImmutableArgumentContext};
use crate::errors::ThrowableList;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use verifyica_model::Throwable;

/// A pre/post hook wrapping every user-visible invocation in the
/// engine.
///
/// Every hook defaults to a no-op so an interceptor only needs to
/// override the stages it cares about. `AfterEach`/`AfterAll` have no
/// pre-hook: those phases always run to completion, so there is
/// nothing meaningful to abort.
#[async_trait]
pub trait Interceptor<T, A>: Send + Sync
where
    T: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    /// Ordering among built-in interceptors; class-supplied
    /// interceptors always run after every built-in regardless of
    /// this value (see [`InterceptorRegistry`]).
    fn order(&self) -> i32 {
        0
    }

    /// Runs before the test instance is constructed.
    async fn pre_instantiate(&self, _class: &ClassContext) -> Result<(), Throwable> {
        Ok(())
    }
    /// Runs after the test instance is constructed (or construction failed).
    async fn post_instantiate(
        &self,
        _class: &ClassContext,
        _instance: Option<&mut T>,
        _error: Option<&Throwable>,
    ) -> Result<(), Throwable> {
        Ok(())
    }

    /// Runs before a `Prepare` method.
    async fn pre_prepare(&self, _class: &ClassContext) -> Result<(), Throwable> {
        Ok(())
    }
    /// Runs after a `Prepare` method.
    async fn post_prepare(&self, _class: &ClassContext, _error: Option<&Throwable>) -> Result<(), Throwable> {
        Ok(())
    }

    /// Runs before a `BeforeAll` method.
    async fn pre_before_all(&self, _ctx: &ArgumentContext<A>) -> Result<(), Throwable> {
        Ok(())
    }
    /// Runs after a `BeforeAll` method.
    async fn post_before_all(
        &self,
        _ctx: &ArgumentContext<A>,
        _error: Option<&Throwable>,
    ) -> Result<(), Throwable> {
        Ok(())
    }

    /// Runs before a `BeforeEach` method.
    async fn pre_before_each(&self, _ctx: &ArgumentContext<A>) -> Result<(), Throwable> {
        Ok(())
    }
    /// Runs after a `BeforeEach` method.
    async fn post_before_each(
        &self,
        _ctx: &ArgumentContext<A>,
        _error: Option<&Throwable>,
    ) -> Result<(), Throwable> {
        Ok(())
    }

    /// Runs before a `Test` method.
    async fn pre_test(&self, _ctx: &ImmutableArgumentContext<A>) -> Result<(), Throwable> {
        Ok(())
    }
    /// Runs after a `Test` method.
    async fn post_test(
        &self,
        _ctx: &ImmutableArgumentContext<A>,
        _error: Option<&Throwable>,
    ) -> Result<(), Throwable> {
        Ok(())
    }

    /// Runs after an `AfterEach` method. There is no pre-hook: `AfterEach` always runs.
    async fn post_after_each(
        &self,
        _ctx: &ArgumentContext<A>,
        _error: Option<&Throwable>,
    ) -> Result<(), Throwable> {
        Ok(())
    }
    /// Runs after an `AfterAll` method. There is no pre-hook: `AfterAll` always runs.
    async fn post_after_all(
        &self,
        _ctx: &ArgumentContext<A>,
        _error: Option<&Throwable>,
    ) -> Result<(), Throwable> {
        Ok(())
    }

    /// Runs before a `Conclude` method.
    async fn pre_conclude(&self, _class: &ClassContext) -> Result<(), Throwable> {
        Ok(())
    }
    /// Runs after a `Conclude` method.
    async fn post_conclude(&self, _class: &ClassContext, _error: Option<&Throwable>) -> Result<(), Throwable> {
        Ok(())
    }

    /// Runs once the class context's store has been closed, regardless
    /// of outcome; purely observational, no throwable can be raised.
    async fn on_destroy(&self, _class: &ClassContext) {}
}

/// Orders built-in interceptors ahead of class-supplied ones.
///
/// Built-ins are sorted by [`Interceptor::order`] (ties broken by
/// registration order); class-supplied interceptors, from the class's
/// `ClassInterceptorSupplier`, are appended in the order the supplier
/// returned them.
pub struct InterceptorRegistry<T, A> {
    ordered: Vec<Arc<dyn Interceptor<T, A>>>,
}

impl<T, A> InterceptorRegistry<T, A>
where
    T: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    /// Builds a registry from built-in and class-supplied interceptors.
    pub fn new(
        mut built_ins: Vec<Arc<dyn Interceptor<T, A>>>,
        class_supplied: Vec<Arc<dyn Interceptor<T, A>>>,
    ) -> Self {
        built_ins.sort_by_key(|i| i.order());
        let mut ordered = built_ins;
        ordered.extend(class_supplied);
        Self { ordered }
    }

    /// The fully ordered interceptor chain: built-ins first, then
    /// class-supplied, in the order pre hooks should run.
    pub fn pre_order(&self) -> &[Arc<dyn Interceptor<T, A>>] {
        &self.ordered
    }
}

/// Runs `pre` hooks over `interceptors`, in order, stopping at (and
/// returning) the first throwable.
pub async fn run_pre_hooks<T, A, F, Fut>(
    interceptors: &[Arc<dyn Interceptor<T, A>>],
    mut call: F,
) -> Result<(), Throwable>
where
    T: Send + Sync + 'static,
    A: Send + Sync + 'static,
    F: FnMut(&Arc<dyn Interceptor<T, A>>) -> Fut,
    Fut: Future<Output = Result<(), Throwable>>,
{
    for interceptor in interceptors {
        call(interceptor).await?;
    }
    Ok(())
}

/// Runs `post` hooks over `interceptors`, in reverse registration
/// order. Every hook runs regardless of whether an earlier one threw;
/// throwables are appended to `errors`.
pub async fn run_post_hooks<T, A, F, Fut>(
    interceptors: &[Arc<dyn Interceptor<T, A>>],
    errors: &mut ThrowableList,
    mut call: F,
) where
    T: Send + Sync + 'static,
    A: Send + Sync + 'static,
    F: FnMut(&Arc<dyn Interceptor<T, A>>) -> Fut,
    Fut: Future<Output = Result<(), Throwable>>,
{
    for interceptor in interceptors.iter().rev() {
        if let Err(e) = call(interceptor).await {
            errors.push(e);
        }
    }
}
