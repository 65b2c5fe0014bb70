// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the supervisor.

/// Errors from spawning, monitoring, or reloading the embedded collector.
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    /// The child process could not be spawned at all.
    #[error("failed to spawn collector subprocess: {0}")]
    SpawnFailed(String),

    /// A blue/green reload's candidate never reported healthy within its
    /// deadline; the reload was aborted and the previously active instance
    /// retained.
    #[error("reload aborted: candidate failed to become healthy: {reason}")]
    ReloadFailed {
        /// Why the candidate was judged unhealthy (last probe failure, or
        /// deadline exceeded).
        reason: String,
    },

    /// The restart budget for the active slot is exhausted; no further
    /// restart attempts will be made until it refills.
    #[error("restart budget exhausted after {attempts} attempt(s)")]
    RestartBudgetExhausted {
        /// Attempts made before the budget ran out.
        attempts: u32,
    },

    /// The descriptor could not be persisted to its generation-scoped path.
    #[error("failed to write descriptor to {path}: {source}")]
    DescriptorWriteFailed {
        /// Destination path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A signal could not be delivered to the child's process group.
    #[error("failed to signal process group {pgid}: {source}")]
    SignalFailed {
        /// Target process group id.
        pgid: u32,
        /// Underlying error.
        #[source]
        source: nix::Error,
    },

    /// The supervisor could not read the child's resource statistics (the
    /// memory-ceiling check degrades to "unknown" rather than failing the
    /// instance outright when this happens transiently).
    #[error("failed to read resource statistics for pid {pid}: {reason}")]
    ResourceReadFailed {
        /// The pid that could not be read.
        pid: u32,
        /// Why.
        reason: String,
    },
}
