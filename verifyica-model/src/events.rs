// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events streamed from the engine to an `ExecutionListener`.
//!
//! For every node in the descriptor tree the engine emits exactly one
//! [`Event::Started`] followed by exactly one of [`Event::Skipped`]
//! (zero or more times) plus a terminal [`Event::Finished`]. A
//! parent's `Finished` event is always emitted strictly after the
//! terminal event of every descendant.

use crate::{ExecutionResult, UniqueId};

/// One listener event.
///
/// `Serialize`-only (see [`crate::ExecutionResult`]'s own impl): this
/// is the shape a host's JSON event log would write, not a type meant
/// to be read back.
#[derive(Debug, serde::Serialize)]
pub enum Event {
    /// A node began executing.
    Started(UniqueId),
    /// A node was skipped rather than run (e.g. because a `beforeAll`
    /// failed, or because it follows a scenario-mode failure, or
    /// because an ancestor never began executing at all). `Skipped`
    /// stands in for the terminal event: a skipped node never also
    /// gets a `Finished`. Whether `Started` precedes it depends on
    /// whether the node's own subtree began — a node whose parent
    /// failed before reaching it is skipped with no prior `Started`.
    Skipped(UniqueId, String),
    /// A node reached a terminal state.
    Finished(UniqueId, ExecutionResult),
}

impl Event {
    /// The id of the node this event concerns.
    pub fn node_id(&self) -> &UniqueId {
        match self {
            Event::Started(id) => id,
            Event::Skipped(id, _) => id,
            Event::Finished(id, _) => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_event_serializes_id_and_result() {
        let id = UniqueId::engine().with_class("com.example.T");
        let event = Event::Finished(id.clone(), ExecutionResult::Successful);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["Finished"][0], id.to_string());
        assert_eq!(json["Finished"][1]["status"], "successful");
    }
}
