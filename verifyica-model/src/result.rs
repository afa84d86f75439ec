// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::Throwable;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::fmt;

/// The terminal status of a node in the descriptor tree.
///
/// Carried on `finished` listener events (see [`crate::events`]). The
/// `FAILED` variant carries the first throwable observed on any path
/// through the node, per the propagation policy in the engine's error
/// handling design.
pub enum ExecutionResult {
    /// The node, and everything beneath it, completed without error.
    Successful,
    /// The node failed; this is the first throwable observed on the
    /// path through the node.
    Failed(Throwable),
    /// The node was aborted rather than run to completion (a
    /// `SkipRequest`, or an ancestor's setup failure skip-announcing
    /// this node).
    Aborted(Option<Throwable>),
}

impl ExecutionResult {
    /// `true` for [`ExecutionResult::Successful`].
    pub fn is_successful(&self) -> bool {
        matches!(self, ExecutionResult::Successful)
    }

    /// `true` for [`ExecutionResult::Failed`].
    pub fn is_failed(&self) -> bool {
        matches!(self, ExecutionResult::Failed(_))
    }

    /// `true` for [`ExecutionResult::Aborted`].
    pub fn is_aborted(&self) -> bool {
        matches!(self, ExecutionResult::Aborted(_))
    }
}

impl fmt::Debug for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionResult::Successful => write!(f, "Successful"),
            ExecutionResult::Failed(t) => write!(f, "Failed({t})"),
            ExecutionResult::Aborted(Some(t)) => write!(f, "Aborted({t})"),
            ExecutionResult::Aborted(None) => write!(f, "Aborted"),
        }
    }
}

// A `Throwable` is an opaque `Box<dyn Error>`, so this can't be a
// derived, round-trippable `Serialize`/`Deserialize` pair; it's a
// one-way rendering for a host's JSON event log, same as the engine's
// own listener events.
impl Serialize for ExecutionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (status, message) = match self {
            ExecutionResult::Successful => ("successful", None),
            ExecutionResult::Failed(throwable) => ("failed", Some(throwable.to_string())),
            ExecutionResult::Aborted(throwable) => ("aborted", throwable.as_ref().map(ToString::to_string)),
        };
        let mut state = serializer.serialize_struct("ExecutionResult", 2)?;
        state.serialize_field("status", status)?;
        state.serialize_field("message", &message)?;
        state.end()
    }
}

/// A summary of one complete engine run, suitable for a CLI to turn
/// into an exit code: zero if every test was successful or aborted,
/// non-zero if any test failed or discovery failed.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunSummary {
    /// Number of test methods that completed successfully.
    pub successful_count: usize,
    /// Number of test methods that failed.
    pub failed_count: usize,
    /// Number of test methods that were aborted (skipped).
    pub aborted_count: usize,
    /// `true` if discovery itself failed before any test ran.
    pub discovery_failed: bool,
}

impl RunSummary {
    /// `true` if the run, as a whole, should be considered successful:
    /// no failures and discovery succeeded.
    pub fn is_successful(&self) -> bool {
        !self.discovery_failed && self.failed_count == 0
    }

    /// Records one test method's terminal result.
    pub fn record(&mut self, result: &ExecutionResult) {
        match result {
            ExecutionResult::Successful => self.successful_count += 1,
            ExecutionResult::Failed(_) => self.failed_count += 1,
            ExecutionResult::Aborted(_) => self.aborted_count += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_is_successful_iff_no_failures_and_discovery_ok() {
        let mut summary = RunSummary::default();
        summary.record(&ExecutionResult::Successful);
        summary.record(&ExecutionResult::Aborted(None));
        assert!(summary.is_successful());

        summary.record(&ExecutionResult::Failed("boom".into()));
        assert!(!summary.is_successful());
    }

    #[test]
    fn discovery_failure_overrides_clean_counts() {
        let mut summary = RunSummary {
            discovery_failed: true,
            ..Default::default()
        };
        summary.record(&ExecutionResult::Successful);
        assert!(!summary.is_successful());
    }

    #[test]
    fn summary_round_trips_through_json() {
        let summary = RunSummary {
            successful_count: 3,
            failed_count: 1,
            aborted_count: 2,
            discovery_failed: false,
        };
        let json = serde_json::to_string(&summary).unwrap();
        let parsed: RunSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(summary, parsed);
    }

    #[test]
    fn execution_result_serializes_status_and_message() {
        let json = serde_json::to_value(ExecutionResult::Failed("boom".into())).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["message"], "boom");

        let json = serde_json::to_value(ExecutionResult::Successful).unwrap();
        assert_eq!(json["status"], "successful");
        assert!(json["message"].is_null());
    }
}
