// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the engine.
//!
//! See the module-level taxonomy: [`DiscoveryError`] and
//! [`ConfigError`] are fatal and abort before any test event is
//! emitted; [`LifecycleError`] and [`CloseError`] are captured per
//! state machine and reported through listener events rather than
//! returned to the caller.

use miette::Diagnostic;
use std::fmt;
use thiserror::Error;
use verifyica_model::Throwable;

/// An error that aborts discovery before any test event is emitted.
///
/// Bad selectors, a class declaring more than one method for the same
/// lifecycle role, or a malformed filter file all fall under this.
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// A class declared more than one method for the same lifecycle
    /// role (`ArgumentSupplier`, `Prepare`, `Conclude`, `BeforeAll`,
    /// `AfterAll`, `BeforeEach`, `AfterEach`, `Test` is exempt since
    /// many are expected, `ClassInterceptorSupplier`).
    #[error(
        "class `{class_name}` declares {count} methods for lifecycle role `{role}` \
         (at most one is allowed)"
    )]
    DuplicateLifecycleRole {
        /// The offending class.
        class_name: String,
        /// The lifecycle role that was duplicated.
        role: &'static str,
        /// How many methods were found.
        count: usize,
    },

    /// The argument supplier for a class threw.
    #[error("argument supplier for class `{class_name}` failed")]
    SupplierFailed {
        /// The offending class.
        class_name: String,
        /// The underlying error.
        #[source]
        source: Throwable,
    },

    /// A filter file could not be parsed.
    #[error("filter file `{path}` is malformed at line {line}: {message}")]
    FilterParse {
        /// The path of the filter file.
        path: String,
        /// The 1-based line number of the offending record.
        line: usize,
        /// A human-readable description of the problem.
        message: String,
    },

    /// A `class-name` or `tag` filter regex failed to compile.
    #[error("invalid filter regex `{pattern}`")]
    InvalidFilterRegex {
        /// The offending pattern.
        pattern: String,
        /// The underlying regex compiler error.
        #[source]
        source: regex::Error,
    },

    /// A `UniqueId` selector could not be parsed.
    #[error("invalid unique id selector")]
    InvalidSelector(#[from] verifyica_model::UniqueIdParseError),
}

/// An error constructing or instantiating a test class.
///
/// This is a class-level failure: the class is recorded as failed and
/// its argument children are skip-announced rather than started.
#[derive(Debug, Error)]
#[error("failed to instantiate test class `{class_name}`")]
pub struct InstantiationError {
    class_name: String,
    #[source]
    source: Throwable,
}

impl InstantiationError {
    /// Creates a new instantiation error for `class_name`.
    pub fn new(class_name: impl Into<String>, source: Throwable) -> Self {
        Self {
            class_name: class_name.into(),
            source,
        }
    }
}

/// A throwable captured while auto-closing a store entry or an
/// argument's payload.
///
/// Close errors are appended to a node's result throwables but never
/// mask an earlier setup or test failure.
#[derive(Debug, Error)]
#[error("failed to close `{target}`")]
pub struct CloseError {
    target: String,
    #[source]
    source: Throwable,
}

impl CloseError {
    /// Creates a new close error describing what failed to close.
    pub fn new(target: impl Into<String>, source: Throwable) -> Self {
        Self {
            target: target.into(),
            source,
        }
    }
}

/// Errors in the engine's own configuration layer: malformed values
/// for a known configuration key, or a config file that failed to
/// parse.
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum ConfigError {
    /// A known configuration key held a value of the wrong shape.
    #[error("configuration key `{key}` has invalid value `{value}`: {reason}")]
    InvalidValue {
        /// The configuration key.
        key: &'static str,
        /// The value that failed to parse.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The underlying layered config source failed to build or parse.
    #[error("failed to load engine configuration")]
    Source(#[source] Box<config::ConfigError>),
}

impl From<config::ConfigError> for ConfigError {
    fn from(source: config::ConfigError) -> Self {
        ConfigError::Source(Box::new(source))
    }
}

/// A list of throwables collected from a single node's teardown path,
/// e.g. multiple store entries failing to close.
///
/// The first element, if any, is the throwable reported as the node's
/// result; the rest are informational.
#[derive(Debug, Default)]
pub struct ThrowableList {
    throwables: Vec<Throwable>,
}

impl ThrowableList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a throwable. The first one recorded is the one that
    /// determines the node's reported result (see
    /// [`ThrowableList::first`]); later ones are kept only so
    /// diagnostics can mention them.
    pub fn push(&mut self, throwable: Throwable) {
        self.throwables.push(throwable);
    }

    /// `true` if no throwable has been recorded.
    pub fn is_empty(&self) -> bool {
        self.throwables.is_empty()
    }

    /// The first throwable recorded, if any. This is the value a
    /// state machine reports as the node's terminal result.
    pub fn into_first(mut self) -> Option<Throwable> {
        if self.throwables.is_empty() {
            None
        } else {
            Some(self.throwables.remove(0))
        }
    }

    /// All throwables recorded, in recording order.
    pub fn as_slice(&self) -> &[Throwable] {
        &self.throwables
    }
}

impl fmt::Display for ThrowableList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, t) in self.throwables.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{t}")?;
        }
        Ok(())
    }
}
