// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured data types shared between the Verifyica engine and its
//! host integrations.
//!
//! This crate is intentionally dependency-light: it holds the value
//! types that cross the boundary between the engine and a host test
//! platform (identifiers, arguments, results, listener events) without
//! pulling in the scheduler, interceptor pipeline, or any of the
//! engine's async machinery. A host that only wants to render results
//! (a console reporter, an IDE plugin) can depend on this crate alone.

mod argument;
mod id;
mod result;
mod throwable;

pub mod events;

pub use argument::Argument;
pub use id::{IdSegment, UniqueId, UniqueIdParseError};
pub use result::{ExecutionResult, RunSummary};
pub use throwable::{SkipRequest, Throwable};
