// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the config engine.

use serde::Serialize;

/// Errors that can occur validating, rendering, or merging configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A user-configuration field failed schema validation.
    #[error("invalid configuration at `{field}`: {reason}")]
    InvalidConfig {
        /// The dotted field path, e.g. `"service.name"`.
        field: String,
        /// Why it failed.
        reason: String,
    },

    /// A discovered service's type has no matching template.
    #[error("no template registered for service type `{service_type}`")]
    UnknownTemplate {
        /// The service type string key.
        service_type: String,
    },

    /// Two fragments could not be merged (e.g. incompatible leaf types at
    /// the same path).
    #[error("merge conflict at `{path}`: {reason}")]
    MergeConflict {
        /// The dotted path where the conflict occurred.
        path: String,
        /// A description of the conflicting values.
        reason: String,
    },

    /// Failed to parse the configuration document itself (YAML/JSON
    /// syntax error), as opposed to a schema violation within a
    /// successfully parsed document.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A collection of validation failures, surfaced together so a caller
    /// (e.g. the `POST /v1/config` handler) can report every offending
    /// field in one response rather than failing fast on the first.
    #[error("{} validation error(s)", .0.len())]
    Multiple(Vec<ConfigError>),
}

/// A non-fatal warning produced during validation/rendering. Unresolved
/// placeholders surface this way rather than as hard failures; validation
/// failures halt the render, warnings merely propagate alongside the
/// result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigWarning {
    /// The field or placeholder this warning concerns.
    pub field: String,
    /// The warning message.
    pub message: String,
}
