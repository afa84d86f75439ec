// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::error::Error as StdError;
use std::fmt;

/// A boxed, opaque error raised by user code: a `prepare`/`before*`/
/// `after*`/`conclude`/`test` method, an interceptor hook, or a
/// `close` call on an auto-closeable value.
///
/// The engine never needs to inspect the contents of a `Throwable`; it
/// only needs to carry it to the first state machine transition that
/// reports it and, eventually, to the listener.
pub type Throwable = Box<dyn StdError + Send + Sync + 'static>;

/// A sentinel raised by user code from within a `Test`, `BeforeEach`,
/// or `AfterEach` method to mark the current test as *aborted* rather
/// than *failed*.
///
/// This is a distinct result variant rather than relying on a
/// language-level control-flow exception: the per-test-method state
/// machine checks for it explicitly after invoking the user method.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct SkipRequest {
    reason: Option<String>,
}

impl SkipRequest {
    /// Creates a skip request with no reason given.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a skip request carrying a human-readable reason.
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }

    /// The reason given for the skip, if any.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl fmt::Display for SkipRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "skipped: {reason}"),
            None => write!(f, "skipped"),
        }
    }
}

impl StdError for SkipRequest {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let request = SkipRequest::with_reason("not applicable on this platform");
        let json = serde_json::to_string(&request).unwrap();
        let parsed: SkipRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.reason(), request.reason());
    }
}
