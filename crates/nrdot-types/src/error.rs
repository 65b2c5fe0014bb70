// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors shared by the data-model types themselves (construction-time
//! invariant violations). Component-level errors (discovery, config,
//! supervision, pipeline) live in their own crates and wrap these where
//! relevant.

/// Errors that can occur constructing or mutating a core data-model value.
#[derive(thiserror::Error, Debug)]
pub enum TypesError {
    /// A `ServiceFact` was constructed with no corroborating signal tag.
    #[error("a ServiceFact requires at least one signal tag")]
    EmptySignalSet,

    /// An attribute path did not resolve to a leaf value while descending
    /// through nested maps/lists.
    #[error("attribute path `{path}` does not resolve to a value")]
    InvalidAttributePath {
        /// The dotted path that failed to resolve.
        path: String,
    },
}
