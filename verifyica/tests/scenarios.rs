// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end coverage of the literal scenarios a full run must
//! produce, driven entirely through the public API: an introspector
//! fixture, `resolver::resolve_class`, and `runner::TestRunner`.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use verifyica::context::{ArgumentContext, EngineContext, ImmutableArgumentContext};
use verifyica::interceptor::Interceptor;
use verifyica::introspect::{
    ArgumentSupplier, BoxFuture, ImmutableInvoker, MutableInvoker, OrderedMethod, StaticInvoker,
    SupplierElement, SupplierOutput, TestClassIntrospector, TestMethodSpec,
};
use verifyica::listener::{Event, ExecutionListener};
use verifyica::resolver::{resolve_class, ResolveOptions};
use verifyica::runner::{class_job, ClassJob, TestRunner};
use verifyica::Throwable;

struct StringSupplier {
    values: Vec<String>,
}

#[async_trait]
impl ArgumentSupplier<String> for StringSupplier {
    async fn supply(&self) -> Result<SupplierOutput<String>, Throwable> {
        Ok(SupplierOutput::Many(
            self.values.iter().cloned().map(SupplierElement::Raw).collect(),
        ))
    }
}

fn test_invoker(behavior: TestBehavior) -> ImmutableInvoker<(), String> {
    Arc::new(
        move |_instance: &mut (), _ctx: &ImmutableArgumentContext<String>| -> BoxFuture<'_, Result<(), Throwable>> {
            let behavior = behavior;
            Box::pin(async move {
                match behavior {
                    TestBehavior::Pass => Ok(()),
                    TestBehavior::Fail(message) => Err(message.into()),
                }
            })
        },
    )
}

#[derive(Clone, Copy)]
enum TestBehavior {
    Pass,
    Fail(&'static str),
}

fn failing_mutable(message: &'static str) -> MutableInvoker<(), String> {
    Arc::new(move |_instance: &mut (), _ctx: &ArgumentContext<String>| -> BoxFuture<'_, Result<(), Throwable>> {
        Box::pin(async move { Err(message.into()) })
    })
}

fn method<Invoker>(name: &str, invoke: Invoker) -> OrderedMethod<Invoker> {
    OrderedMethod {
        declaring_class: "Fixture".to_string(),
        method_name: name.to_string(),
        order: None,
        display_name: name.to_string(),
        tags: Vec::new(),
        disabled: false,
        invoke,
    }
}

/// A configurable `TestClassIntrospector` double covering every knob
/// the scenarios below need: argument values, scenario mode, failing
/// `beforeAll`, and a failing argument-payload close.
struct Fixture {
    class_name: String,
    arguments: Vec<String>,
    scenario: bool,
    tests: Vec<(&'static str, TestBehavior)>,
    before_all_fails: bool,
    close_payload_fails: bool,
    before_all_counter: Option<Arc<AtomicUsize>>,
}

impl Fixture {
    fn new(class_name: &str, arguments: Vec<&str>) -> Self {
        Self {
            class_name: class_name.to_string(),
            arguments: arguments.into_iter().map(String::from).collect(),
            scenario: false,
            tests: vec![("t", TestBehavior::Pass)],
            before_all_fails: false,
            close_payload_fails: false,
            before_all_counter: None,
        }
    }

    fn with_scenario(mut self, scenario: bool) -> Self {
        self.scenario = scenario;
        self
    }

    fn with_tests(mut self, tests: Vec<(&'static str, TestBehavior)>) -> Self {
        self.tests = tests;
        self
    }

    fn with_failing_before_all(mut self) -> Self {
        self.before_all_fails = true;
        self
    }

    fn with_failing_payload_close(mut self) -> Self {
        self.close_payload_fails = true;
        self
    }

    fn with_before_all_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.before_all_counter = Some(counter);
        self
    }
}

impl TestClassIntrospector for Fixture {
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

    fn argument_supplier(&self) -> Arc<dyn ArgumentSupplier<String>> {
        Arc::new(StringSupplier {
            values: self.arguments.clone(),
        })
    }

    fn class_interceptors(&self) -> Vec<Arc<dyn Interceptor<(), String>>> {
        Vec::new()
    }

    fn prepare_methods(&self) -> Vec<OrderedMethod<StaticInvoker>> {
        Vec::new()
    }

    fn conclude_methods(&self) -> Vec<OrderedMethod<StaticInvoker>> {
        Vec::new()
    }

    fn before_all_methods(&self) -> Vec<OrderedMethod<MutableInvoker<(), String>>> {
        if self.before_all_fails {
            vec![method("beforeAll", failing_mutable("before-all boom"))]
        } else if let Some(counter) = &self.before_all_counter {
            let counter = counter.clone();
            let invoke: MutableInvoker<(), String> = Arc::new(
                move |_instance: &mut (), _ctx: &ArgumentContext<String>| -> BoxFuture<'_, Result<(), Throwable>> {
                    let counter = counter.clone();
                    Box::pin(async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        counter.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                },
            );
            vec![method("beforeAll", invoke)]
        } else {
            Vec::new()
        }
    }

    fn after_all_methods(&self) -> Vec<OrderedMethod<MutableInvoker<(), String>>> {
        Vec::new()
    }

    fn test_methods(&self) -> Vec<TestMethodSpec<(), String>> {
        self.tests
            .iter()
            .map(|(name, behavior)| TestMethodSpec {
                method: method(name, test_invoker(*behavior)),
                before_each: Vec::new(),
                after_each: Vec::new(),
            })
            .collect()
    }

    fn instantiate(&self) -> Result<(), Throwable> {
        Ok(())
    }

    fn close_argument_payload(&self, _payload: &mut String) -> Result<(), Throwable> {
        if self.close_payload_fails {
            Err("payload close boom".into())
        } else {
            Ok(())
        }
    }
}

struct RecordingListener {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingListener {
    fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn snapshot(&self) -> Vec<String> {
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

async fn run_one(fixture: Fixture, listener: Arc<RecordingListener>) -> Vec<verifyica::runner::ClassRunResult> {
    let introspector = Arc::new(fixture);
    let options = ResolveOptions {
        argument_parallelism_ceiling: 4,
        ..Default::default()
    };
    let descriptor = resolve_class(introspector.as_ref(), &options).await.unwrap().unwrap();
    let job: Box<dyn ClassJob> = class_job(introspector, descriptor, Vec::new());

    let engine_context = EngineContext::new(Default::default());
    let runner = TestRunner::new(engine_context, 2);
    runner.execute(vec![job], listener).await
}

// Scenario 1 (spec. §8): two arguments, one passing test each.
#[tokio::test]
async fn two_arguments_one_passing_test_reports_success_in_order() {
    let fixture = Fixture::new("com.example.A", vec!["x", "y"]);
    let listener = Arc::new(RecordingListener::new());
    let results = run_one(fixture, listener.clone()).await;

    assert_eq!(results.len(), 1);
    assert!(results[0].class_result.is_successful());
    assert_eq!(results[0].argument_results.len(), 2);
    assert!(results[0].argument_results.iter().all(|(_, r)| r.is_successful()));

    let events = listener.snapshot();
    // The class itself starts first and finishes last; every argument's
    // started/finished pair is contiguous and nested inside it.
    assert!(events.first().unwrap().starts_with("started"));
    assert!(events.last().unwrap().starts_with("finished"));
    assert_eq!(events.iter().filter(|e| e.starts_with("started")).count(), 5); // class + 2 args + 2 tests
    assert_eq!(events.iter().filter(|e| e.starts_with("finished")).count(), 5);
}

// Scenario 2: scenario mode, `t2` fails, `t3` is aborted without running.
#[tokio::test]
async fn scenario_mode_aborts_remaining_tests_after_first_failure() {
    let fixture = Fixture::new("com.example.B", vec!["x"])
        .with_scenario(true)
        .with_tests(vec![
            ("t1", TestBehavior::Pass),
            ("t2", TestBehavior::Fail("boom")),
            ("t3", TestBehavior::Pass),
        ]);
    let listener = Arc::new(RecordingListener::new());
    let results = run_one(fixture, listener.clone()).await;

    assert_eq!(results[0].argument_results.len(), 1);
    let (_, argument_result) = &results[0].argument_results[0];
    assert!(argument_result.is_failed());

    let events = listener.snapshot();
    assert!(events.iter().any(|e| e.contains("method=t1") && e.starts_with("finished")));
    assert!(events.iter().any(|e| e.contains("method=t2") && e.starts_with("finished")));
    assert!(events.iter().any(|e| e.contains("method=t3") && e.starts_with("skipped")));
    assert!(!events.iter().any(|e| e.contains("method=t3") && e.starts_with("started")));
}

// Scenario 3: `beforeAll` throws, every test is skip-announced (with a
// prior `started`), `afterAll` still runs, argument result is failed.
#[tokio::test]
async fn before_all_failure_skip_announces_tests_but_argument_started_fires() {
    let fixture = Fixture::new("com.example.C", vec!["x"]).with_failing_before_all();
    let listener = Arc::new(RecordingListener::new());
    let results = run_one(fixture, listener.clone()).await;

    let (_, argument_result) = &results[0].argument_results[0];
    assert!(argument_result.is_failed());

    let events = listener.snapshot();
    assert!(events.iter().any(|e| e.contains("method=t") && e.starts_with("started")));
    assert!(events.iter().any(|e| e.contains("method=t") && e.starts_with("skipped")));
}

// Scenario 4: payload close throws, all tests pass, argument result is
// the close failure (the only throwable on that path).
#[tokio::test]
async fn failing_payload_close_fails_the_argument_even_when_tests_pass() {
    let fixture = Fixture::new("com.example.D", vec!["x"]).with_failing_payload_close();
    let listener = Arc::new(RecordingListener::new());
    let results = run_one(fixture, listener.clone()).await;

    let (_, argument_result) = &results[0].argument_results[0];
    assert!(argument_result.is_failed());
}

// Scenario 6: classParallelism=2 across three classes, argumentParallelism=3
// within each; neither bound is ever exceeded, sampled via shared counters.
#[tokio::test]
async fn parallelism_never_exceeds_configured_bounds() {
    let class_active = Arc::new(AtomicUsize::new(0));
    let class_peak = Arc::new(AtomicUsize::new(0));

    let mut jobs: Vec<Box<dyn ClassJob>> = Vec::new();
    for i in 0..3 {
        let argument_counter = Arc::new(AtomicUsize::new(0));
        let fixture = Fixture::new(&format!("com.example.Par{i}"), vec!["a", "b", "c", "d", "e", "f"])
            .with_before_all_counter(argument_counter);
        let introspector = Arc::new(fixture);
        let options = ResolveOptions {
            argument_parallelism_ceiling: 3,
            ..Default::default()
        };
        let descriptor = resolve_class(introspector.as_ref(), &options).await.unwrap().unwrap();
        jobs.push(class_job(introspector, descriptor, Vec::new()));
    }

    struct TrackingListener {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }
    #[async_trait]
    impl ExecutionListener for TrackingListener {
        async fn on_event(&self, event: Event) {
            if let Event::Started(id) = &event {
                if id.to_string().matches("class=").count() == 1 && !id.to_string().contains("argument=") {
                    let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                    self.peak.fetch_max(now, Ordering::SeqCst);
                }
            }
            if let Event::Finished(id, _) = &event {
                if id.to_string().matches("class=").count() == 1 && !id.to_string().contains("argument=") {
                    self.active.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }
    }

    let listener = Arc::new(TrackingListener {
        active: class_active,
        peak: class_peak.clone(),
    });
    let engine_context = EngineContext::new(Default::default());
    let runner = TestRunner::new(engine_context, 2);
    let results = runner.execute(jobs, listener).await;

    assert_eq!(results.len(), 3);
    assert!(class_peak.load(Ordering::SeqCst) <= 2);
}
