// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! External collaborator interfaces named, but not implemented, by this
//! crate: [`TestClassIntrospector`] (reflection/annotation discovery)
//! and [`ArgumentSupplier`] (argument supplier invocation).
//!
//! A host binds a concrete test class to the engine by implementing
//! [`TestClassIntrospector`] for it — by hand, via a code-generation
//! macro, or via a runtime reflection/plugin layer. The engine only
//! ever calls through these traits; it has no knowledge of how a
//! host discovers annotated methods.

use crate::context::{ArgumentContext, ClassContext, ImmutableArgumentContext};
use crate::interceptor::Interceptor;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use verifyica_model::{Argument, Throwable};

/// A boxed future, for invoker closures that can't otherwise name
/// their return type.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An invoker for a static, class-scoped lifecycle method
/// (`Prepare`/`Conclude`): takes the class context, no test instance.
pub type StaticInvoker = Arc<dyn for<'a> Fn(&'a ClassContext) -> BoxFuture<'a, Result<(), Throwable>> + Send + Sync>;

/// An invoker for an instance method that receives the *mutable*
/// argument context view (`BeforeAll`/`AfterAll`/`BeforeEach`/`AfterEach`).
pub type MutableInvoker<T, A> = Arc<
    dyn for<'a> Fn(&'a mut T, &'a ArgumentContext<A>) -> BoxFuture<'a, Result<(), Throwable>>
        + Send
        + Sync,
>;

/// An invoker for an instance method that receives the *immutable*
/// argument context view (`Test`).
pub type ImmutableInvoker<T, A> = Arc<
    dyn for<'a> Fn(&'a mut T, &'a ImmutableArgumentContext<A>) -> BoxFuture<'a, Result<(), Throwable>>
        + Send
        + Sync,
>;

/// One lifecycle method, with the ordering/display metadata the
/// resolver needs to place it in the descriptor tree.
///
/// Tags, `Order`, `DisplayName`, and `Disabled` are sibling metadata
/// on every method per the data model; `Invoker` varies by role
/// (static vs. mutable-instance vs. immutable-instance).
pub struct OrderedMethod<Invoker> {
    /// The class that declares this method (for duplicate-role validation).
    pub declaring_class: String,
    /// The method's name, used for `UniqueId` construction and display.
    pub method_name: String,
    /// Explicit ordering; `None` sorts after any `Some`, ties broken by display name.
    pub order: Option<i32>,
    /// The display name shown to the listener; defaults to `method_name`.
    pub display_name: String,
    /// Tags attached to this method.
    pub tags: Vec<String>,
    /// `true` if this method is marked disabled and should be pruned.
    pub disabled: bool,
    /// The typed invoker itself.
    pub invoke: Invoker,
}

impl<Invoker> OrderedMethod<Invoker> {
    /// The `(order, display_name)` sort key used for stable sibling ordering.
    pub fn sort_key(&self) -> (Option<i32>, &str) {
        (self.order, self.display_name.as_str())
    }
}

/// One `Test` method together with its own `beforeEach`/`afterEach`
/// chain, mirroring `TestMethodDescriptor`'s fields in the data model.
pub struct TestMethodSpec<T, A> {
    /// Ordering/display/tag metadata and the test invoker itself.
    pub method: OrderedMethod<ImmutableInvoker<T, A>>,
    /// `beforeEach` methods, in resolved hierarchy order.
    pub before_each: Vec<OrderedMethod<MutableInvoker<T, A>>>,
    /// `afterEach` methods, in resolved hierarchy order.
    pub after_each: Vec<OrderedMethod<MutableInvoker<T, A>>>,
}

/// The shape a supplier's raw (un-normalized) return value takes,
/// after a host adapter has materialized any iterable/iterator/
/// enumeration/lazy sequence into a `Vec`.
pub enum SupplierOutput<A> {
    /// The supplier returned nothing (`null`): the class is pruned.
    None,
    /// The supplier returned a single, raw (non-`Argument`) payload.
    SingleRaw(A),
    /// The supplier returned a single, already-named `Argument`.
    SingleArgument(Argument<A>),
    /// The supplier returned a collection; each element is either raw
    /// (gets a synthesized name) or already an `Argument`.
    Many(Vec<SupplierElement<A>>),
}

/// One element of a multi-valued supplier return.
pub enum SupplierElement<A> {
    /// A raw payload; the resolver synthesizes `argument[i]` as its name.
    Raw(A),
    /// An already-named argument.
    Named(Argument<A>),
}

/// The external collaborator that invokes a class's argument-supplier
/// method.
#[async_trait]
pub trait ArgumentSupplier<A>: Send + Sync
where
    A: Send + Sync + 'static,
{
    /// Invokes the supplier method, returning its raw, un-normalized output.
    async fn supply(&self) -> Result<SupplierOutput<A>, Throwable>;
}

/// The external collaborator that performs reflection/annotation
/// discovery over a registered test class.
///
/// A host binds one implementation per concrete test class. The
/// engine only ever drives the methods this trait exposes; it never
/// inspects a class's fields, annotations, or type hierarchy directly.
pub trait TestClassIntrospector: Send + Sync + 'static {
    /// The test class's instantiated type (the `testInstance`).
    type Instance: Send + Sync + 'static;
    /// The payload type of arguments this class's supplier produces.
    type Argument: Send + Sync + 'static;

    /// The class's fully-qualified name.
    fn class_name(&self) -> &str;

    /// The class's display name (defaults to `class_name` if unset).
    fn display_name(&self) -> &str;

    /// Explicit class ordering; see [`OrderedMethod::sort_key`].
    fn order(&self) -> Option<i32>;

    /// Tags attached to the class, for tag-based filtering.
    fn tags(&self) -> &[String];

    /// `true` if this class opted into scenario mode (spec. §4.2,
    /// §4.3): on the first test failure within an argument, remaining
    /// tests are skip-announced as aborted rather than attempted.
    fn is_scenario(&self) -> bool;

    /// This class's declared `argumentParallelism`: the cap on
    /// concurrently executing argument subtrees within this class,
    /// before the resolver clamps it to the engine-wide ceiling.
    ///
    /// Default is unbounded from the class's side, leaving the
    /// engine-wide ceiling as the sole cap.
    fn argument_parallelism(&self) -> usize {
        usize::MAX
    }

    /// The argument-supplier collaborator for this class.
    fn argument_supplier(&self) -> Arc<dyn ArgumentSupplier<Self::Argument>>;

    /// Interceptors supplied by this class's `ClassInterceptorSupplier`,
    /// in declaration order. Built-ins are prepended by the
    /// [`crate::interceptor::InterceptorRegistry`], not here.
    fn class_interceptors(&self) -> Vec<Arc<dyn Interceptor<Self::Instance, Self::Argument>>>;

    /// `Prepare` methods across the class's type hierarchy.
    fn prepare_methods(&self) -> Vec<OrderedMethod<StaticInvoker>>;

    /// `Conclude` methods across the class's type hierarchy.
    fn conclude_methods(&self) -> Vec<OrderedMethod<StaticInvoker>>;

    /// `BeforeAll` methods across the class's type hierarchy.
    fn before_all_methods(&self) -> Vec<OrderedMethod<MutableInvoker<Self::Instance, Self::Argument>>>;

    /// `AfterAll` methods across the class's type hierarchy.
    fn after_all_methods(&self) -> Vec<OrderedMethod<MutableInvoker<Self::Instance, Self::Argument>>>;

    /// Every (non-disabled) `Test` method, each with its own resolved
    /// `beforeEach`/`afterEach` chain.
    fn test_methods(&self) -> Vec<TestMethodSpec<Self::Instance, Self::Argument>>;

    /// Constructs the test instance. Called exactly once per class,
    /// wrapped by the interceptor pipeline's
    /// `preInstantiate → construct → postInstantiate` stages.
    fn instantiate(&self) -> Result<Self::Instance, Throwable>;

    /// Closes an argument's payload if it is auto-closeable, as part of
    /// the per-argument state machine's `AUTO_CLOSE_ARG_*` transition.
    ///
    /// Default no-op. Rust has no runtime "implements Closeable" check
    /// the way a reflection-based host would; a host whose `Argument`
    /// type wraps a closeable resource overrides this to release it.
    fn close_argument_payload(&self, _payload: &mut Self::Argument) -> Result<(), Throwable> {
        Ok(())
    }
}
