// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The host test-platform listener: an external collaborator the
//! engine streams [`Event`]s to.
//!
//! The engine never propagates a user throwable out of the runner;
//! callers only ever see structured events through this trait plus
//! the final [`verifyica_model::RunSummary`].

use async_trait::async_trait;
pub use verifyica_model::events::Event;

/// Receives the engine's listener events.
///
/// Implementations are expected to be cheap to call repeatedly and
/// not to block the calling worker for long; the engine awaits each
/// call before continuing the owning node's state machine.
#[async_trait]
pub trait ExecutionListener: Send + Sync {
    /// Called for every emitted event, in the order described in the
    /// module-level docs on [`verifyica_model::events`].
    async fn on_event(&self, event: Event);
}

#[async_trait]
impl<F> ExecutionListener for F
where
    F: Fn(Event) + Send + Sync,
{
    async fn on_event(&self, event: Event) {
        (self)(event)
    }
}
