// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared test doubles for the engine's own unit tests: a minimal
//! `TestClassIntrospector`/`ArgumentSupplier` pair that needs no
//! reflection layer, so individual modules can exercise the resolver,
//! scheduler, and state machines without a real host binding.

use crate::context::{ArgumentContext, ClassContext, ImmutableArgumentContext};
use crate::interceptor::Interceptor;
use crate::listener::{Event, ExecutionListener};
use crate::introspect::{
    ArgumentSupplier, BoxFuture, ImmutableInvoker, MutableInvoker, OrderedMethod, StaticInvoker,
    SupplierElement, SupplierOutput, TestClassIntrospector, TestMethodSpec,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use verifyica_model::Throwable;

/// Initializes a `tracing` subscriber routed through the test harness's
/// own writer, so `debug!`/`warn!` calls inside the engine surface in
/// `cargo test`'s captured output instead of being silently dropped.
/// Safe to call from multiple tests; only the first call takes effect.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub(crate) fn noop_mutable_invoker() -> MutableInvoker<(), String> {
    Arc::new(|_instance: &mut (), _ctx: &ArgumentContext<String>| -> BoxFuture<'_, Result<(), Throwable>> {
        Box::pin(async { Ok(()) })
    })
}

pub(crate) fn noop_test_invoker() -> ImmutableInvoker<(), String> {
    Arc::new(
        |_instance: &mut (), _ctx: &ImmutableArgumentContext<String>| -> BoxFuture<'_, Result<(), Throwable>> {
            Box::pin(async { Ok(()) })
        },
    )
}

pub(crate) fn failing_test_invoker(message: &'static str) -> ImmutableInvoker<(), String> {
    Arc::new(
        move |_instance: &mut (), _ctx: &ImmutableArgumentContext<String>| -> BoxFuture<'_, Result<(), Throwable>> {
            Box::pin(async move { Err(message.into()) })
        },
    )
}

pub(crate) fn static_method(name: &str) -> OrderedMethod<StaticInvoker> {
    OrderedMethod {
        declaring_class: "SimpleIntrospector".to_string(),
        method_name: name.to_string(),
        order: None,
        display_name: name.to_string(),
        tags: Vec::new(),
        disabled: false,
        invoke: Arc::new(|_class: &ClassContext| -> BoxFuture<'_, Result<(), Throwable>> {
            Box::pin(async { Ok(()) })
        }),
    }
}

pub(crate) fn mutable_method(name: &str, declaring_class: &str) -> OrderedMethod<MutableInvoker<(), String>> {
    OrderedMethod {
        declaring_class: declaring_class.to_string(),
        method_name: name.to_string(),
        order: None,
        display_name: name.to_string(),
        tags: Vec::new(),
        disabled: false,
        invoke: noop_mutable_invoker(),
    }
}

struct StringSupplier {
    values: Option<Vec<String>>,
}

#[async_trait]
impl ArgumentSupplier<String> for StringSupplier {
    async fn supply(&self) -> Result<SupplierOutput<String>, Throwable> {
        match &self.values {
            None => Ok(SupplierOutput::None),
            Some(values) => Ok(SupplierOutput::Many(
                values.iter().cloned().map(SupplierElement::Raw).collect(),
            )),
        }
    }
}

/// A minimal `TestClassIntrospector` implementation for unit tests.
pub(crate) struct SimpleIntrospector {
    class_name: String,
    arguments: Option<Vec<String>>,
    duplicate_before_all: bool,
    scenario: bool,
    test_bodies: Vec<(&'static str, ImmutableInvoker<(), String>)>,
    interceptors: Vec<Arc<dyn Interceptor<(), String>>>,
    argument_parallelism: usize,
}

impl SimpleIntrospector {
    pub(crate) fn new(class_name: &str) -> Self {
        Self {
            class_name: class_name.to_string(),
            arguments: Some(vec!["default".to_string()]),
            duplicate_before_all: false,
            scenario: false,
            test_bodies: vec![("test", noop_test_invoker())],
            interceptors: Vec::new(),
            argument_parallelism: usize::MAX,
        }
    }

    pub(crate) fn with_arguments(mut self, values: Vec<&str>) -> Self {
        self.arguments = Some(values.into_iter().map(String::from).collect());
        self
    }

    pub(crate) fn with_no_arguments(mut self) -> Self {
        self.arguments = None;
        self
    }

    pub(crate) fn with_duplicate_before_all(mut self) -> Self {
        self.duplicate_before_all = true;
        self
    }

    pub(crate) fn with_scenario(mut self, scenario: bool) -> Self {
        self.scenario = scenario;
        self
    }

    pub(crate) fn with_test_bodies(mut self, bodies: Vec<(&'static str, ImmutableInvoker<(), String>)>) -> Self {
        self.test_bodies = bodies;
        self
    }

    pub(crate) fn with_interceptors(mut self, interceptors: Vec<Arc<dyn Interceptor<(), String>>>) -> Self {
        self.interceptors = interceptors;
        self
    }

    pub(crate) fn with_argument_parallelism(mut self, argument_parallelism: usize) -> Self {
        self.argument_parallelism = argument_parallelism;
        self
    }
}

impl TestClassIntrospector for SimpleIntrospector {
    type Instance = ();
    type Argument = String;

    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn display_name(&self) -> &str {
        &self.class_name
    }

    fn order(&self) -> Option<i32> {
        None
    }

    fn tags(&self) -> &[String] {
        &[]
    }

    fn is_scenario(&self) -> bool {
        self.scenario
    }

    fn argument_parallelism(&self) -> usize {
        self.argument_parallelism
    }

    fn argument_supplier(&self) -> Arc<dyn ArgumentSupplier<String>> {
        Arc::new(StringSupplier {
            values: self.arguments.clone(),
        })
    }

    fn class_interceptors(&self) -> Vec<Arc<dyn Interceptor<(), String>>> {
        self.interceptors.clone()
    }

    fn prepare_methods(&self) -> Vec<OrderedMethod<StaticInvoker>> {
        Vec::new()
    }

    fn conclude_methods(&self) -> Vec<OrderedMethod<StaticInvoker>> {
        Vec::new()
    }

    fn before_all_methods(&self) -> Vec<OrderedMethod<MutableInvoker<(), String>>> {
        if self.duplicate_before_all {
            vec![
                mutable_method("beforeAll1", "SimpleIntrospector"),
                mutable_method("beforeAll2", "SimpleIntrospector"),
            ]
        } else {
            Vec::new()
        }
    }

    fn after_all_methods(&self) -> Vec<OrderedMethod<MutableInvoker<(), String>>> {
        Vec::new()
    }

    fn test_methods(&self) -> Vec<TestMethodSpec<(), String>> {
        self.test_bodies
            .iter()
            .map(|(name, invoker)| TestMethodSpec {
                method: OrderedMethod {
                    declaring_class: self.class_name.clone(),
                    method_name: name.to_string(),
                    order: None,
                    display_name: name.to_string(),
                    tags: Vec::new(),
                    disabled: false,
                    invoke: invoker.clone(),
                },
                before_each: Vec::new(),
                after_each: Vec::new(),
            })
            .collect()
    }

    fn instantiate(&self) -> Result<(), Throwable> {
        Ok(())
    }
}

/// A recording `ExecutionListener` double, used to assert event
/// ordering and skip/finish sequencing in unit tests.
pub(crate) struct RecordingListener {
    pub(crate) events: Arc<Mutex<Vec<String>>>,
}

impl RecordingListener {
    pub(crate) fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl ExecutionListener for RecordingListener {
    async fn on_event(&self, event: Event) {
        let rendered = match &event {
            Event::Started(id) => format!("started({id})"),
            Event::Skipped(id, reason) => format!("skipped({id}, {reason})"),
            Event::Finished(id, result) => format!("finished({id}, {result:?})"),
        };
        self.events.lock().push(rendered);
    }
}
