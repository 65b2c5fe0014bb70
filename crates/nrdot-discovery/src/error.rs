// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for service discovery.

/// A single scanner's failure, surfaced in the discovery result envelope
/// rather than aborting discovery (individual scanner
/// failures are non-fatal").
#[derive(thiserror::Error, Debug, Clone)]
#[error("{scanner} scanner failed: {message}")]
pub struct ScannerError {
    /// Which scanner failed (`"process"`, `"port"`, `"config_file"`, or
    /// `"package"`).
    pub scanner: &'static str,
    /// A human-readable description of the failure.
    pub message: String,
}
