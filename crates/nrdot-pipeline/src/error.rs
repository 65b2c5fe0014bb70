// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the pipeline processors.

/// A single-item processing failure. Per the pipeline's contract, the
/// offending item is dropped and counted; the batch continues — this type
/// never aborts a whole batch by itself (a processor panic is what does
/// that, and it's caught at the registry level rather than surfaced here).
#[derive(thiserror::Error, Debug, Clone)]
pub enum PipelineError {
    /// An attribute value could not be interpreted the way the processor
    /// expected (e.g. a transform input metric whose value is non-numeric).
    #[error("malformed attribute at `{path}`: {reason}")]
    MalformedAttribute {
        /// Dotted attribute path.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A declared regex pattern failed to compile at processor-construction
    /// time.
    #[error("pattern compilation failed: {0}")]
    PatternCompilation(String),
}
