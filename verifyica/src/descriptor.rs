// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The descriptor tree: `Engine → Class → Argument → TestMethod`.
//!
//! A [`ClassDescriptor`] is monomorphic in the class's introspector
//! type `I`; a run mixing several distinct test classes is
//! represented at the scheduler boundary by type-erased per-class
//! jobs (see [`crate::runner`]), not by a heterogeneous tree here.
//!
//! There is no `EngineDescriptor` type: the engine root is only the
//! implicit `UniqueId::engine()` prefix every other id is built on.
//! No listener scenario ever announces an engine-level `Started`
//! node, so a dedicated root descriptor has nothing to carry.

use crate::introspect::{ImmutableInvoker, MutableInvoker, OrderedMethod, StaticInvoker, TestClassIntrospector};
use verifyica_model::{Argument, UniqueId};

/// A `Test` method together with its id and resolved `beforeEach`/`afterEach` chain.
pub struct TestMethodDescriptor<I: TestClassIntrospector> {
    /// This node's unique id.
    pub id: UniqueId,
    /// `beforeEach` methods, in resolved hierarchy order.
    pub before_each_methods: Vec<OrderedMethod<MutableInvoker<I::Instance, I::Argument>>>,
    /// The test method itself.
    pub test_method: OrderedMethod<ImmutableInvoker<I::Instance, I::Argument>>,
    /// `afterEach` methods, in resolved hierarchy order.
    pub after_each_methods: Vec<OrderedMethod<MutableInvoker<I::Instance, I::Argument>>>,
}

impl<I: TestClassIntrospector> TestMethodDescriptor<I> {
    pub(crate) fn sort_key(&self) -> (Option<i32>, &str) {
        self.test_method.sort_key()
    }
}

/// One argument-level subtree.
pub struct ArgumentDescriptor<I: TestClassIntrospector> {
    /// This node's unique id.
    pub id: UniqueId,
    /// The argument index within the class's resolved argument list.
    pub argument_index: usize,
    /// The argument itself.
    pub argument: Argument<I::Argument>,
    /// `beforeAll` methods, in resolved hierarchy order.
    pub before_all_methods: Vec<OrderedMethod<MutableInvoker<I::Instance, I::Argument>>>,
    /// `afterAll` methods, in resolved hierarchy order.
    pub after_all_methods: Vec<OrderedMethod<MutableInvoker<I::Instance, I::Argument>>>,
    /// Test method children, already pruned of disabled methods and
    /// sorted by `(Order, DisplayName)`.
    pub test_methods: Vec<TestMethodDescriptor<I>>,
}

impl<I: TestClassIntrospector> ArgumentDescriptor<I> {
    pub(crate) fn sort_key(&self) -> (usize, &str) {
        (self.argument_index, self.argument.name())
    }
}

/// One class-level subtree.
pub struct ClassDescriptor<I: TestClassIntrospector> {
    /// This node's unique id.
    pub id: UniqueId,
    /// The class's display name.
    pub display_name: String,
    /// `prepare` methods, in resolved hierarchy order.
    pub prepare_methods: Vec<OrderedMethod<StaticInvoker>>,
    /// `conclude` methods, in resolved hierarchy order.
    pub conclude_methods: Vec<OrderedMethod<StaticInvoker>>,
    /// This class's resolved argument parallelism (already clamped to
    /// the engine-wide ceiling).
    pub argument_parallelism: usize,
    /// `true` if this class is in scenario mode.
    pub scenario: bool,
    /// Argument children, already pruned of empty arguments and
    /// sorted by `(argument_index, name)`.
    pub arguments: Vec<ArgumentDescriptor<I>>,
}

impl<I: TestClassIntrospector> ClassDescriptor<I> {
    /// `true` if this descriptor has no argument children and should
    /// be pruned from the tree, per the "every class node has ≥1
    /// argument child or is pruned" invariant.
    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }
}

