// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// One segment of a [`UniqueId`].
///
/// Segments name a level of the descriptor tree: the engine root, a
/// test class, an argument index within that class, or a test method
/// within that argument.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum IdSegment {
    /// The engine root. Always `verifyica`.
    Engine(String),
    /// A test class, identified by its fully-qualified name.
    Class(String),
    /// An argument, identified by its index within the class.
    Argument(usize),
    /// A test method, identified by its name.
    Method(String),
}

impl fmt::Display for IdSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdSegment::Engine(name) => write!(f, "engine={name}"),
            IdSegment::Class(name) => write!(f, "class={name}"),
            IdSegment::Argument(index) => write!(f, "argument={index}"),
            IdSegment::Method(name) => write!(f, "method={name}"),
        }
    }
}

/// A hierarchical identifier for a node in the descriptor tree.
///
/// `UniqueId`s are built bottom-up by the resolver and form a stable
/// address space for selectors, filters, and listener events:
/// `[engine=verifyica]/[class=<FQCN>]/[argument=<index>]/[method=<name>]`.
/// A selector addressing a deeper level implies its ancestors are
/// included as well.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct UniqueId {
    segments: Vec<IdSegment>,
}

impl UniqueId {
    /// The engine root identifier, `[engine=verifyica]`.
    pub fn engine() -> Self {
        Self {
            segments: vec![IdSegment::Engine("verifyica".to_string())],
        }
    }

    /// Returns a new identifier extending `self` with a class segment.
    pub fn with_class(&self, class_name: impl Into<String>) -> Self {
        self.extended(IdSegment::Class(class_name.into()))
    }

    /// Returns a new identifier extending `self` with an argument segment.
    pub fn with_argument(&self, index: usize) -> Self {
        self.extended(IdSegment::Argument(index))
    }

    /// Returns a new identifier extending `self` with a method segment.
    pub fn with_method(&self, method_name: impl Into<String>) -> Self {
        self.extended(IdSegment::Method(method_name.into()))
    }

    fn extended(&self, segment: IdSegment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    /// Returns `true` if `self` is `other` or an ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &UniqueId) -> bool {
        other.segments.len() >= self.segments.len()
            && self.segments[..] == other.segments[..self.segments.len()]
    }

    /// The individual segments, root first.
    pub fn segments(&self) -> &[IdSegment] {
        &self.segments
    }

    /// The class name, if this id addresses a class or deeper.
    pub fn class_name(&self) -> Option<&str> {
        self.segments.iter().find_map(|s| match s {
            IdSegment::Class(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// The argument index, if this id addresses an argument or deeper.
    pub fn argument_index(&self) -> Option<usize> {
        self.segments.iter().find_map(|s| match s {
            IdSegment::Argument(index) => Some(*index),
            _ => None,
        })
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                write!(f, "/")?;
            }
            first = false;
            write!(f, "[{segment}]")?;
        }
        Ok(())
    }
}

// Serialized as its `Display` string rather than its segment list, so
// the wire form is the same stable address a selector or filter uses.
impl Serialize for UniqueId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for UniqueId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Error returned when a [`UniqueId`] fails to parse from its string form.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("malformed unique id `{input}`: {reason}")]
pub struct UniqueIdParseError {
    input: String,
    reason: String,
}

impl FromStr for UniqueId {
    type Err = UniqueIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        for raw in s.split('/') {
            let raw = raw
                .strip_prefix('[')
                .and_then(|r| r.strip_suffix(']'))
                .ok_or_else(|| UniqueIdParseError {
                    input: s.to_string(),
                    reason: format!("segment `{raw}` is not bracketed"),
                })?;
            let (key, value) = raw.split_once('=').ok_or_else(|| UniqueIdParseError {
                input: s.to_string(),
                reason: format!("segment `{raw}` has no `=`"),
            })?;
            let segment = match key {
                "engine" => IdSegment::Engine(value.to_string()),
                "class" => IdSegment::Class(value.to_string()),
                "argument" => {
                    let index = value.parse::<usize>().map_err(|_| UniqueIdParseError {
                        input: s.to_string(),
                        reason: format!("argument index `{value}` is not a number"),
                    })?;
                    IdSegment::Argument(index)
                }
                "method" => IdSegment::Method(value.to_string()),
                other => {
                    return Err(UniqueIdParseError {
                        input: s.to_string(),
                        reason: format!("unknown segment kind `{other}`"),
                    });
                }
            };
            segments.push(segment);
        }
        if segments.is_empty() {
            return Err(UniqueIdParseError {
                input: s.to_string(),
                reason: "empty id".to_string(),
            });
        }
        Ok(Self { segments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        let id = UniqueId::engine()
            .with_class("com.example.MyTest")
            .with_argument(0)
            .with_method("shouldWork");
        let rendered = id.to_string();
        let parsed: UniqueId = rendered.parse().unwrap();
        assert_eq!(id, parsed);
        assert_eq!(
            rendered,
            "[engine=verifyica]/[class=com.example.MyTest]/[argument=0]/[method=shouldWork]"
        );
    }

    #[test]
    fn ancestor_selectors_imply_inclusion() {
        let class_id = UniqueId::engine().with_class("A");
        let argument_id = class_id.with_argument(0);
        let method_id = argument_id.with_method("t");
        assert!(class_id.is_ancestor_of(&method_id));
        assert!(argument_id.is_ancestor_of(&method_id));
        assert!(!method_id.is_ancestor_of(&class_id));
    }

    #[test]
    fn rejects_malformed_segments() {
        assert!("not-bracketed".parse::<UniqueId>().is_err());
        assert!("[argument=notanumber]".parse::<UniqueId>().is_err());
        assert!("[bogus=1]".parse::<UniqueId>().is_err());
    }

    #[test]
    fn class_name_and_argument_index_accessors() {
        let id = UniqueId::engine().with_class("A").with_argument(3);
        assert_eq!(id.class_name(), Some("A"));
        assert_eq!(id.argument_index(), Some(3));
    }

    #[test]
    fn serializes_as_its_display_string() {
        let id = UniqueId::engine().with_class("A").with_argument(0);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let parsed: UniqueId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn deserializing_a_malformed_string_fails() {
        let err = serde_json::from_str::<UniqueId>("\"not-bracketed\"").unwrap_err();
        assert!(err.to_string().contains("malformed unique id"));
    }
}
