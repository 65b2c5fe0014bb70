// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the process-telemetry reader.

/// One per-process read that failed mid-scan; accumulated rather than
/// aborting the whole scan.
#[derive(Debug, Clone)]
pub struct ReadError {
    /// The pid whose files could not be fully read.
    pub pid: u32,
    /// What went wrong.
    pub reason: String,
}

/// Errors from `scan`/`scan_delta`.
#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    /// Some processes disappeared or became unreadable mid-scan. The scan
    /// still completed for every process that stayed readable.
    #[error("{} process(es) could not be read during this scan", .read_errors.len())]
    PartialScan {
        /// The per-pid failures accumulated during the scan.
        read_errors: Vec<ReadError>,
    },

    /// The root process-information directory itself could not be read;
    /// the scan could not proceed at all.
    #[error("failed to read the process directory {path}: {source}")]
    RootUnreadable {
        /// The path that failed to open (normally `/proc`).
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
