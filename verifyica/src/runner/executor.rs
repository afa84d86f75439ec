// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Drives one argument node through the per-argument machine (spec.
//! §4.3): `START → BEFORE_ALL_* → (EXECUTE_*|SKIP_*) → AFTER_ALL_* →
//! AUTO_CLOSE_ARG_* → AUTO_CLOSE_STORE_* → END`.

use crate::context::{ArgumentContext, ClassContext};
use crate::descriptor::{ArgumentDescriptor, TestMethodDescriptor};
use crate::errors::ThrowableList;
use crate::interceptor::{run_post_hooks, run_pre_hooks, Interceptor};
use crate::introspect::{MutableInvoker, OrderedMethod, TestClassIntrospector};
use crate::listener::{Event, ExecutionListener};
use crate::runner::state_machine::run_test_method;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::instrument;
use verifyica_model::{ExecutionResult, Throwable, UniqueId};

async fn skip_announce(listener: &dyn ExecutionListener, id: &UniqueId, reason: &str, with_started: bool) {
    if with_started {
        listener.on_event(Event::Started(id.clone())).await;
    }
    listener.on_event(Event::Skipped(id.clone(), reason.to_string())).await;
}

/// Runs one argument's whole subtree: `beforeAll`, every test method
/// (honoring scenario mode), `afterAll`, then the two auto-close
/// phases. Returns the argument node's terminal [`ExecutionResult`].
///
/// Takes the descriptor by value: this is also what lets the class
/// machine move each argument into its own spawned task rather than
/// sharing a borrow of the class's whole argument list.
#[instrument(level = "debug", skip_all, fields(argument = %descriptor.id))]
pub(crate) async fn run_argument<I: TestClassIntrospector>(
    introspector: &I,
    instance: &Arc<AsyncMutex<I::Instance>>,
    class_context: &ClassContext,
    descriptor: ArgumentDescriptor<I>,
    interceptors: &[Arc<dyn Interceptor<I::Instance, I::Argument>>],
    scenario: bool,
    listener: &dyn ExecutionListener,
) -> ExecutionResult {
    let ArgumentDescriptor {
        id,
        argument_index,
        argument,
        before_all_methods,
        after_all_methods,
        test_methods,
    } = descriptor;

    listener.on_event(Event::Started(id.clone())).await;

    let argument_context = ArgumentContext::new(class_context.clone(), argument_index, argument);

    let mut result_throwables = ThrowableList::new();

    if let Err(e) = run_before_all(instance, &argument_context, &before_all_methods, interceptors).await {
        result_throwables.push(e);
    }

    if result_throwables.is_empty() {
        run_tests(instance, &argument_context, &test_methods, interceptors, scenario, listener, &mut result_throwables).await;
    } else {
        for test_method in &test_methods {
            skip_announce(listener, &test_method.id, "before-all failed", true).await;
        }
    }

    run_after_all(instance, &argument_context, &after_all_methods, interceptors, &mut result_throwables).await;

    close_argument_payload(introspector, &argument_context, &mut result_throwables).await;
    close_argument_store(&argument_context, &mut result_throwables);

    let result = match result_throwables.into_first() {
        None => ExecutionResult::Successful,
        Some(t) => ExecutionResult::Failed(t),
    };
    listener.on_event(Event::Finished(id, clone_result(&result))).await;
    result
}

/// Skip-announces an argument subtree whose class never reached it
/// (a `prepare`/instantiation failure, not a `beforeAll` failure).
pub(crate) async fn skip_announce_argument<I: TestClassIntrospector>(
    descriptor: &ArgumentDescriptor<I>,
    reason: &str,
    listener: &dyn ExecutionListener,
) {
    skip_announce(listener, &descriptor.id, reason, false).await;
    for test_method in &descriptor.test_methods {
        skip_announce(listener, &test_method.id, reason, false).await;
    }
}

/// Rebuilds an [`ExecutionResult`] carrying a fresh throwable with the
/// same message, so a result can be both inspected locally and handed
/// to the listener (`Throwable` itself is not `Clone`).
fn clone_result(result: &ExecutionResult) -> ExecutionResult {
    match result {
        ExecutionResult::Successful => ExecutionResult::Successful,
        ExecutionResult::Failed(t) => ExecutionResult::Failed(t.to_string().into()),
        ExecutionResult::Aborted(t) => ExecutionResult::Aborted(t.as_ref().map(|t| t.to_string().into())),
    }
}

async fn run_before_all<I: TestClassIntrospector>(
    instance: &Arc<AsyncMutex<I::Instance>>,
    argument_context: &ArgumentContext<I::Argument>,
    methods: &[OrderedMethod<MutableInvoker<I::Instance, I::Argument>>],
    interceptors: &[Arc<dyn Interceptor<I::Instance, I::Argument>>],
) -> Result<(), Throwable> {
    run_pre_hooks(interceptors, |i| i.pre_before_all(argument_context)).await?;

    let mut body_error = None;
    for method in methods {
        let mut guard = instance.lock().await;
        if let Err(e) = (method.invoke)(&mut guard, argument_context).await {
            body_error = Some(e);
            break;
        }
    }

    let mut errors = ThrowableList::new();
    run_post_hooks(interceptors, &mut errors, |i| i.post_before_all(argument_context, body_error.as_ref())).await;

    match body_error {
        Some(e) => Err(e),
        None => match errors.into_first() {
            Some(e) => Err(e),
            None => Ok(()),
        },
    }
}

async fn run_after_all<I: TestClassIntrospector>(
    instance: &Arc<AsyncMutex<I::Instance>>,
    argument_context: &ArgumentContext<I::Argument>,
    methods: &[OrderedMethod<MutableInvoker<I::Instance, I::Argument>>],
    interceptors: &[Arc<dyn Interceptor<I::Instance, I::Argument>>],
    throwables: &mut ThrowableList,
) {
    let mut body_error = None;
    for method in methods {
        let mut guard = instance.lock().await;
        if let Err(e) = (method.invoke)(&mut guard, argument_context).await {
            if body_error.is_none() {
                body_error = Some(e);
            }
        }
    }

    run_post_hooks(interceptors, throwables, |i| i.post_after_all(argument_context, body_error.as_ref())).await;

    if let Some(e) = body_error {
        throwables.push(e);
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_tests<I: TestClassIntrospector>(
    instance: &Arc<AsyncMutex<I::Instance>>,
    argument_context: &ArgumentContext<I::Argument>,
    test_methods: &[TestMethodDescriptor<I>],
    interceptors: &[Arc<dyn Interceptor<I::Instance, I::Argument>>],
    scenario: bool,
    listener: &dyn ExecutionListener,
    result_throwables: &mut ThrowableList,
) {
    let mut short_circuited = false;
    for test_method in test_methods {
        if short_circuited {
            skip_announce(listener, &test_method.id, "scenario: aborted after a prior test failure", true).await;
            continue;
        }

        listener.on_event(Event::Started(test_method.id.clone())).await;
        let outcome = {
            let mut guard = instance.lock().await;
            run_test_method::<I>(&mut guard, argument_context, test_method, interceptors).await
        };

        if outcome.is_failed() && result_throwables.is_empty() {
            if let ExecutionResult::Failed(t) = &outcome {
                result_throwables.push(t.to_string().into());
            }
        }

        let reported = clone_result(&outcome);
        listener.on_event(Event::Finished(test_method.id.clone(), reported)).await;

        if scenario && outcome.is_failed() {
            short_circuited = true;
        }
    }
}

async fn close_argument_payload<I: TestClassIntrospector>(
    introspector: &I,
    argument_context: &ArgumentContext<I::Argument>,
    throwables: &mut ThrowableList,
) {
    let mut argument = argument_context.argument();
    if let Err(e) = introspector.close_argument_payload(argument.payload_mut()) {
        throwables.push(e);
    }
}

fn close_argument_store<T>(argument_context: &ArgumentContext<T>, throwables: &mut ThrowableList) {
    for close_error in argument_context.close_store() {
        throwables.push(Box::new(close_error));
    }
}
