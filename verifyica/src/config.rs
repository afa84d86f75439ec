// Copyright (c) The Verifyica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine configuration: a layered `key → string` map (spec. §6)
//! resolved into typed, validated values.
//!
//! Layering follows the `config` crate's builder pattern the way
//! `nextest-runner` layers its own configuration: defaults, then an
//! optional file, then environment overrides.

use crate::errors::ConfigError;
use config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::num::NonZeroUsize;

/// The `engine.class.parallelism` configuration key.
pub const KEY_CLASS_PARALLELISM: &str = "engine.class.parallelism";
/// The `engine.argument.parallelism` configuration key.
pub const KEY_ARGUMENT_PARALLELISM: &str = "engine.argument.parallelism";
/// The `engine.test.class.shuffle` configuration key.
pub const KEY_CLASS_SHUFFLE: &str = "engine.test.class.shuffle";
/// The `engine.filters.filename` configuration key.
pub const KEY_FILTERS_FILENAME: &str = "engine.filters.filename";

/// Raw, unvalidated configuration: every recognized key maps to its
/// raw string value, exactly as spec. §6 describes the external
/// interface.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    values: HashMap<String, String>,
}

impl EngineConfig {
    /// Loads configuration by layering, in increasing priority:
    /// built-in defaults, an optional TOML file at `config_path`, and
    /// `VERIFYICA_*` environment variables.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default(KEY_CLASS_PARALLELISM, 1)?
            .set_default(KEY_ARGUMENT_PARALLELISM, 1)?
            .set_default(KEY_CLASS_SHUFFLE, false)?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::new(path, FileFormat::Toml).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix("VERIFYICA")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let mut values = HashMap::new();
        for key in [
            KEY_CLASS_PARALLELISM,
            KEY_ARGUMENT_PARALLELISM,
            KEY_CLASS_SHUFFLE,
            KEY_FILTERS_FILENAME,
        ] {
            if let Ok(value) = config.get_string(key) {
                values.insert(key.to_string(), value);
            }
        }
        Ok(Self { values })
    }

    /// Looks up a raw configuration value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// The full raw key/value map, for seeding an `EngineContext`.
    pub fn into_map(self) -> HashMap<String, String> {
        self.values
    }

    /// Resolves and validates this configuration into typed values.
    pub fn resolve(&self) -> Result<ResolvedEngineConfig, ConfigError> {
        let class_parallelism = self.parse_non_zero(KEY_CLASS_PARALLELISM, 1)?;
        let argument_parallelism_ceiling = self.parse_non_zero(KEY_ARGUMENT_PARALLELISM, 1)?;
        let shuffle_classes = match self.get(KEY_CLASS_SHUFFLE) {
            None => false,
            Some(value) => value.parse::<bool>().map_err(|_| ConfigError::InvalidValue {
                key: KEY_CLASS_SHUFFLE,
                value: value.to_string(),
                reason: "expected `true` or `false`".to_string(),
            })?,
        };
        let filter_file = self.get(KEY_FILTERS_FILENAME).map(str::to_string);

        Ok(ResolvedEngineConfig {
            class_parallelism,
            argument_parallelism_ceiling,
            shuffle_classes,
            filter_file,
        })
    }

    fn parse_non_zero(&self, key: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
        let raw = self.get(key);
        let value = match raw {
            None => default,
            Some(s) => s.parse::<usize>().map_err(|_| ConfigError::InvalidValue {
                key,
                value: s.to_string(),
                reason: "expected a positive integer".to_string(),
            })?,
        };
        NonZeroUsize::new(value).ok_or(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "must be >= 1".to_string(),
        })
    }
}

/// Validated, typed engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedEngineConfig {
    /// Process-wide cap on concurrently executing class subtrees.
    pub class_parallelism: NonZeroUsize,
    /// Engine-wide ceiling a class's declared `argumentParallelism` is clamped to.
    pub argument_parallelism_ceiling: NonZeroUsize,
    /// `true` to randomize class submission order.
    pub shuffle_classes: bool,
    #[doc(hidden)]
    filter_file: Option<String>,
}

impl ResolvedEngineConfig {
    /// Clamps a declared `argumentParallelism` to an engine-wide
    /// ceiling, per spec. §4.2's configuration rule: `min(declared,
    /// ceiling)`, never below 1.
    pub fn clamp_argument_parallelism(declared: usize, ceiling: usize) -> usize {
        declared.max(1).min(ceiling.max(1))
    }
}

// `filter_file` is carried on `EngineConfig` itself (as a path string)
// rather than threaded through `ResolvedEngineConfig`, since filter
// file *loading* is a discovery-time concern; this field only exists
// so `ResolvedEngineConfig`'s shape documents that a filter file was
// named, without this module owning the parse.
impl EngineConfig {
    /// The configured filter-file path, if any.
    pub fn filter_file_path(&self) -> Option<&str> {
        self.get(KEY_FILTERS_FILENAME)
    }
}
