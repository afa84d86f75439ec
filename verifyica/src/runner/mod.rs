// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The execution engine: the per-test-method, per-argument, and
//! per-class state machines (spec. §4.3–§4.5), and the top-level
//! dispatcher that schedules class jobs across the whole run.
//!
//! Only the dispatcher's types are meant for host code; the state
//! machines are internal plumbing `run_class` composes.

mod class_machine;
mod dispatcher;
mod executor;
mod state_machine;

pub use class_machine::ClassRunResult;
pub use dispatcher::{class_job, ClassJob, ShutdownToken, SummarizingListener, TestRunner};
