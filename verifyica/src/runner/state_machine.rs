// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-test-method machine (spec. §4.4): `START → BEFORE_EACH_* →
//! TEST_* → AFTER_EACH_* → END`.

use crate::context::ArgumentContext;
use crate::descriptor::TestMethodDescriptor;
use crate::errors::ThrowableList;
use crate::interceptor::{run_post_hooks, run_pre_hooks, Interceptor};
use crate::introspect::TestClassIntrospector;
use std::sync::Arc;
use tracing::instrument;
use verifyica_model::{ExecutionResult, SkipRequest, Throwable};

fn as_skip_request(throwable: &Throwable) -> Option<&SkipRequest> {
    throwable.downcast_ref::<SkipRequest>()
}

/// Runs one test method to completion: `beforeEach` (if any), the test
/// body (unless `beforeEach` failed), then `afterEach` unconditionally.
///
/// Teardown (`afterEach`) always runs even if `beforeEach` or the test
/// body failed; the first throwable observed on any of the three
/// phases becomes the node's reported result.
#[instrument(level = "debug", skip_all, fields(method = %descriptor.test_method.method_name))]
pub(crate) async fn run_test_method<I: TestClassIntrospector>(
    instance: &mut I::Instance,
    argument_context: &ArgumentContext<I::Argument>,
    descriptor: &TestMethodDescriptor<I>,
    interceptors: &[Arc<dyn Interceptor<I::Instance, I::Argument>>],
) -> ExecutionResult {
    let mut throwables = ThrowableList::new();

    let before_each_error = run_before_each(instance, argument_context, &descriptor.before_each_methods, interceptors).await;
    if let Err(e) = before_each_error {
        throwables.push(e);
    }

    let mut skip: Option<SkipRequest> = None;
    if throwables.is_empty() {
        match run_test_body(instance, argument_context, descriptor, interceptors).await {
            Ok(()) => {}
            Err(e) => {
                if let Some(s) = as_skip_request(&e) {
                    skip = Some(s.clone());
                } else {
                    throwables.push(e);
                }
            }
        }
    }

    run_after_each(instance, argument_context, &descriptor.after_each_methods, interceptors, &mut throwables).await;

    match skip {
        Some(skip) => {
            let boxed: Throwable = match throwables.into_first() {
                None => Box::new(skip),
                Some(cause) => Box::new(SkipRequestWithCause(skip, Some(cause))),
            };
            ExecutionResult::Aborted(Some(boxed))
        }
        None => match throwables.into_first() {
            None => ExecutionResult::Successful,
            Some(t) => ExecutionResult::Failed(t),
        },
    }
}

// `SkipRequest` itself carries no teardown-failure context; when an
// `afterEach` throws after the body raised a skip, we still want the
// aborted result to mention the teardown failure without losing the
// skip semantics.
#[derive(Debug)]
struct SkipRequestWithCause(SkipRequest, Option<Throwable>);

impl std::fmt::Display for SkipRequestWithCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.1 {
            Some(cause) => write!(f, "{} (teardown also failed: {cause})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

impl std::error::Error for SkipRequestWithCause {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.1.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

async fn run_before_each<I: TestClassIntrospector>(
    instance: &mut I::Instance,
    argument_context: &ArgumentContext<I::Argument>,
    methods: &[crate::introspect::OrderedMethod<crate::introspect::MutableInvoker<I::Instance, I::Argument>>],
    interceptors: &[Arc<dyn Interceptor<I::Instance, I::Argument>>],
) -> Result<(), Throwable> {
    run_pre_hooks(interceptors, |i| i.pre_before_each(argument_context)).await?;

    let mut body_error = None;
    for method in methods {
        if let Err(e) = (method.invoke)(instance, argument_context).await {
            body_error = Some(e);
            break;
        }
    }

    let mut errors = ThrowableList::new();
    run_post_hooks(interceptors, &mut errors, |i| i.post_before_each(argument_context, body_error.as_ref())).await;

    match body_error {
        Some(e) => Err(e),
        None => match errors.into_first() {
            Some(e) => Err(e),
            None => Ok(()),
        },
    }
}

async fn run_test_body<I: TestClassIntrospector>(
    instance: &mut I::Instance,
    argument_context: &ArgumentContext<I::Argument>,
    descriptor: &TestMethodDescriptor<I>,
    interceptors: &[Arc<dyn Interceptor<I::Instance, I::Argument>>],
) -> Result<(), Throwable> {
    let immutable_view = argument_context.immutable_view();
    run_pre_hooks(interceptors, |i| i.pre_test(&immutable_view)).await?;

    let body_result = (descriptor.test_method.invoke)(instance, &immutable_view).await;

    let mut errors = ThrowableList::new();
    run_post_hooks(interceptors, &mut errors, |i| i.post_test(&immutable_view, body_result.as_ref().err())).await;

    match body_result {
        Err(e) => Err(e),
        Ok(()) => match errors.into_first() {
            Some(e) => Err(e),
            None => Ok(()),
        },
    }
}

async fn run_after_each<I: TestClassIntrospector>(
    instance: &mut I::Instance,
    argument_context: &ArgumentContext<I::Argument>,
    methods: &[crate::introspect::OrderedMethod<crate::introspect::MutableInvoker<I::Instance, I::Argument>>],
    interceptors: &[Arc<dyn Interceptor<I::Instance, I::Argument>>],
    throwables: &mut ThrowableList,
) {
    let mut body_error = None;
    for method in methods {
        if let Err(e) = (method.invoke)(instance, argument_context).await {
            if body_error.is_none() {
                body_error = Some(e);
            }
        }
    }

    run_post_hooks(interceptors, throwables, |i| i.post_after_each(argument_context, body_error.as_ref())).await;

    if let Some(e) = body_error {
        throwables.push(e);
    }
}
