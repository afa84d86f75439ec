// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

/// A named payload supplied by a test class: the unit of parameterization.
///
/// Produced by an `ArgumentSupplier` and consumed by exactly one
/// argument-level subtree. The payload may be arbitrary, including a
/// resource that should be auto-closed once the argument's subtree
/// finishes.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct Argument<T> {
    name: String,
    payload: T,
}

impl<T> Argument<T> {
    /// Creates a new named argument.
    pub fn new(name: impl Into<String>, payload: T) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// The display name the resolver assigned to this argument.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Borrows the payload.
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Mutably borrows the payload.
    pub fn payload_mut(&mut self) -> &mut T {
        &mut self.payload
    }

    /// Consumes the argument, returning its payload.
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// The synthesized name the resolver uses for a raw, non-`Argument`
    /// element found at index `i` in a supplier's returned collection.
    pub fn synthesized_name(index: usize) -> String {
        format!("argument[{index}]")
    }
}

impl<T: fmt::Debug> fmt::Debug for Argument<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Argument")
            .field("name", &self.name)
            .field("payload", &self.payload)
            .finish()
    }
}
