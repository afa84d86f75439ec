// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The class-level machine (spec. §4.5): `START → PREPARE_* →
//! ARGUMENTS_COMPLETE → CONCLUDE_* → STORE_CLOSE_* → END`.
//!
//! Instantiation (`preInstantiate → construct → postInstantiate`) runs
//! once per class, ahead of `prepare`; the resulting instance is then
//! shared across every argument worker behind a `tokio::sync::Mutex`,
//! locked only for the duration of each individual lifecycle-method
//! call rather than for a whole argument's lifetime.

use crate::context::{ClassContext, EngineContext};
use crate::descriptor::{ArgumentDescriptor, ClassDescriptor};
use crate::errors::{InstantiationError, ThrowableList};
use crate::interceptor::{run_post_hooks, run_pre_hooks, Interceptor};
use crate::introspect::{OrderedMethod, StaticInvoker, TestClassIntrospector};
use crate::listener::{Event, ExecutionListener};
use crate::runner::executor::{run_argument, skip_announce_argument};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tracing::instrument;
use verifyica_model::{ExecutionResult, Throwable, UniqueId};

/// The outcome of running one class subtree: every argument's terminal
/// result, keyed by its `UniqueId`, plus the class node's own result.
pub struct ClassRunResult {
    /// The class node's own `UniqueId`.
    pub class_id: UniqueId,
    /// The class node's own terminal result (instantiation, `prepare`,
    /// `conclude`, and store-close failures all surface here).
    pub class_result: ExecutionResult,
    /// Each argument's terminal result, in submission order.
    pub argument_results: Vec<(UniqueId, ExecutionResult)>,
}

async fn skip_announce_class<I: TestClassIntrospector>(
    class_id: &UniqueId,
    arguments: &[ArgumentDescriptor<I>],
    reason: &str,
    listener: &dyn ExecutionListener,
) {
    listener.on_event(Event::Skipped(class_id.clone(), reason.to_string())).await;
    for argument in arguments {
        skip_announce_argument(argument, reason, listener).await;
    }
}

async fn instantiate<I: TestClassIntrospector>(
    introspector: &I,
    class_context: &ClassContext,
    interceptors: &[Arc<dyn Interceptor<I::Instance, I::Argument>>],
) -> Result<I::Instance, Throwable> {
    run_pre_hooks(interceptors, |i| i.pre_instantiate(class_context)).await?;

    let mut instance = introspector.instantiate().map_err(|e| -> Throwable {
        Box::new(InstantiationError::new(introspector.class_name(), e))
    });

    let mut errors = ThrowableList::new();
    match &mut instance {
        Ok(inst) => {
            run_post_hooks(interceptors, &mut errors, |i| i.post_instantiate(class_context, Some(&mut *inst), None)).await;
        }
        Err(e) => {
            run_post_hooks(interceptors, &mut errors, |i| i.post_instantiate(class_context, None, Some(&*e))).await;
        }
    }

    match instance {
        Err(e) => Err(e),
        Ok(instance) => match errors.into_first() {
            Some(e) => Err(e),
            None => Ok(instance),
        },
    }
}

async fn run_prepare<I: TestClassIntrospector>(
    class_context: &ClassContext,
    prepare_methods: &[OrderedMethod<StaticInvoker>],
    interceptors: &[Arc<dyn Interceptor<I::Instance, I::Argument>>],
) -> Result<(), Throwable> {
    run_pre_hooks(interceptors, |i| i.pre_prepare(class_context)).await?;

    let mut body_error = None;
    for method in prepare_methods {
        if let Err(e) = (method.invoke)(class_context).await {
            body_error = Some(e);
            break;
        }
    }

    let mut errors = ThrowableList::new();
    run_post_hooks(interceptors, &mut errors, |i| i.post_prepare(class_context, body_error.as_ref())).await;

    match body_error {
        Some(e) => Err(e),
        None => match errors.into_first() {
            Some(e) => Err(e),
            None => Ok(()),
        },
    }
}

async fn run_conclude<I: TestClassIntrospector>(
    class_context: &ClassContext,
    conclude_methods: &[OrderedMethod<StaticInvoker>],
    interceptors: &[Arc<dyn Interceptor<I::Instance, I::Argument>>],
    throwables: &mut ThrowableList,
) {
    let mut body_error = None;
    for method in conclude_methods {
        if let Err(e) = (method.invoke)(class_context).await {
            if body_error.is_none() {
                body_error = Some(e);
            }
        }
    }

    run_post_hooks(interceptors, throwables, |i| i.post_conclude(class_context, body_error.as_ref())).await;

    if let Some(e) = body_error {
        throwables.push(e);
    }
}

/// Drives one class's entire subtree to completion: instantiation,
/// `prepare`, every argument (concurrently, bounded by the class's
/// resolved `argument_parallelism`), `conclude`, then the class-scoped
/// store close.
#[instrument(level = "debug", skip_all, fields(class = %descriptor.id))]
pub(crate) async fn run_class<I: TestClassIntrospector>(
    introspector: Arc<I>,
    engine_context: EngineContext,
    descriptor: ClassDescriptor<I>,
    interceptors: Vec<Arc<dyn Interceptor<I::Instance, I::Argument>>>,
    listener: Arc<dyn ExecutionListener>,
) -> ClassRunResult {
    let ClassDescriptor {
        id,
        display_name: _,
        prepare_methods,
        conclude_methods,
        argument_parallelism,
        scenario,
        arguments,
    } = descriptor;

    let class_context = ClassContext::new(engine_context, introspector.class_name(), argument_parallelism);
    listener.on_event(Event::Started(id.clone())).await;

    let mut result_throwables = ThrowableList::new();

    let instance = match instantiate(introspector.as_ref(), &class_context, &interceptors).await {
        Ok(instance) => Some(Arc::new(AsyncMutex::new(instance))),
        Err(e) => {
            result_throwables.push(e);
            None
        }
    };

    let mut argument_results = Vec::new();

    if let Some(instance) = instance {
        match run_prepare::<I>(&class_context, &prepare_methods, &interceptors).await {
            Ok(()) => {
                argument_results = run_arguments(
                    introspector.clone(),
                    instance,
                    class_context.clone(),
                    scenario,
                    argument_parallelism,
                    arguments,
                    Arc::new(interceptors.clone()),
                    listener.clone(),
                )
                .await;
                if argument_results.iter().any(|(_, r)| r.is_failed()) && result_throwables.is_empty() {
                    result_throwables.push("one or more arguments failed".into());
                }
            }
            Err(e) => {
                for argument in &arguments {
                    skip_announce_argument(argument, "prepare failed", listener.as_ref()).await;
                }
                result_throwables.push(e);
            }
        }
    } else {
        skip_announce_class(&id, &arguments, "instantiation failed", listener.as_ref()).await;
    }

    run_conclude::<I>(&class_context, &conclude_methods, &interceptors, &mut result_throwables).await;

    for close_error in class_context.close() {
        result_throwables.push(Box::new(close_error));
    }
    for interceptor in &interceptors {
        interceptor.on_destroy(&class_context).await;
    }

    let class_result = match result_throwables.into_first() {
        None => ExecutionResult::Successful,
        Some(t) => ExecutionResult::Failed(t),
    };
    let reported = match &class_result {
        ExecutionResult::Successful => ExecutionResult::Successful,
        ExecutionResult::Failed(t) => ExecutionResult::Failed(t.to_string().into()),
        ExecutionResult::Aborted(t) => ExecutionResult::Aborted(t.as_ref().map(|t| t.to_string().into())),
    };
    listener.on_event(Event::Finished(id.clone(), reported)).await;

    ClassRunResult {
        class_id: id,
        class_result,
        argument_results,
    }
}

/// Runs every argument in `arguments` as its own spawned task, bounded
/// to at most `argument_parallelism` running concurrently. The
/// argument's own descriptor is moved into its task, matching
/// `tokio::spawn`'s `'static` requirement.
#[allow(clippy::too_many_arguments)]
async fn run_arguments<I: TestClassIntrospector>(
    introspector: Arc<I>,
    instance: Arc<AsyncMutex<I::Instance>>,
    class_context: ClassContext,
    scenario: bool,
    argument_parallelism: usize,
    arguments: Vec<crate::descriptor::ArgumentDescriptor<I>>,
    interceptors: Arc<Vec<Arc<dyn Interceptor<I::Instance, I::Argument>>>>,
    listener: Arc<dyn ExecutionListener>,
) -> Vec<(UniqueId, ExecutionResult)> {
    let semaphore = Arc::new(Semaphore::new(argument_parallelism.max(1)));
    let mut handles = Vec::with_capacity(arguments.len());

    for argument in arguments {
        let id = argument.id.clone();
        let semaphore = semaphore.clone();
        let introspector = introspector.clone();
        let instance = instance.clone();
        let class_context = class_context.clone();
        let interceptors = interceptors.clone();
        let listener = listener.clone();

        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            run_argument(introspector.as_ref(), &instance, &class_context, argument, &interceptors, scenario, listener.as_ref()).await
        });
        handles.push((id, handle));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (id, handle) in handles {
        let result = handle.await.expect("argument task panicked");
        results.push((id, result));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingListener, SimpleIntrospector};

    fn engine_context() -> EngineContext {
        EngineContext::new(Default::default())
    }

    #[tokio::test]
    async fn successful_class_with_one_argument_runs_to_completion() {
        let introspector = Arc::new(SimpleIntrospector::new("com.example.Ok").with_arguments(vec!["x"]));
        let options = crate::resolver::ResolveOptions {
            argument_parallelism_ceiling: 2,
            ..Default::default()
        };
        let descriptor = crate::resolver::resolve_class(introspector.as_ref(), &options).await.unwrap().unwrap();
        let listener = Arc::new(RecordingListener::new());

        let result = run_class(introspector, engine_context(), descriptor, Vec::new(), listener.clone()).await;
        assert!(result.class_result.is_successful());
        assert_eq!(result.argument_results.len(), 1);
        assert!(result.argument_results[0].1.is_successful());
    }

    #[tokio::test]
    async fn instantiation_failure_skip_announces_every_argument() {
        struct Failing(SimpleIntrospector);
        impl TestClassIntrospector for Failing {
            type Instance = ();
            type Argument = String;
            fn class_name(&self) -> &str {
                self.0.class_name()
            }
            fn display_name(&self) -> &str {
                self.0.display_name()
            }
            fn order(&self) -> Option<i32> {
                self.0.order()
            }
            fn tags(&self) -> &[String] {
                self.0.tags()
            }
            fn is_scenario(&self) -> bool {
                self.0.is_scenario()
            }
            fn argument_supplier(&self) -> Arc<dyn crate::introspect::ArgumentSupplier<String>> {
                self.0.argument_supplier()
            }
            fn class_interceptors(&self) -> Vec<Arc<dyn Interceptor<(), String>>> {
                self.0.class_interceptors()
            }
            fn prepare_methods(&self) -> Vec<OrderedMethod<StaticInvoker>> {
                self.0.prepare_methods()
            }
            fn conclude_methods(&self) -> Vec<OrderedMethod<StaticInvoker>> {
                self.0.conclude_methods()
            }
            fn before_all_methods(&self) -> Vec<OrderedMethod<crate::introspect::MutableInvoker<(), String>>> {
                self.0.before_all_methods()
            }
            fn after_all_methods(&self) -> Vec<OrderedMethod<crate::introspect::MutableInvoker<(), String>>> {
                self.0.after_all_methods()
            }
            fn test_methods(&self) -> Vec<crate::introspect::TestMethodSpec<(), String>> {
                self.0.test_methods()
            }
            fn instantiate(&self) -> Result<(), Throwable> {
                Err("construct boom".into())
            }
        }

        let introspector = Arc::new(Failing(SimpleIntrospector::new("com.example.Bad").with_arguments(vec!["x"])));
        let options = crate::resolver::ResolveOptions {
            argument_parallelism_ceiling: 1,
            ..Default::default()
        };
        let descriptor = crate::resolver::resolve_class(introspector.as_ref(), &options).await.unwrap().unwrap();
        let listener = Arc::new(RecordingListener::new());

        let result = run_class(introspector, engine_context(), descriptor, Vec::new(), listener.clone()).await;
        assert!(result.class_result.is_failed());
        assert!(result.argument_results.is_empty());

        let events = listener.snapshot();
        assert!(events.iter().any(|e| e.starts_with("skipped") && e.contains("argument=0")));
        assert!(!events.iter().any(|e| e.starts_with("started") && e.contains("argument=0")));
    }
}
