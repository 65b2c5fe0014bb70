// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Shared types for the blue/green reload algorithm implemented by
//! `Supervisor::reload`.

use std::time::Duration;

use nrdot_types::descriptor::{Fingerprint, Generation};

/// Timing parameters for one reload attempt.
#[derive(Debug, Clone)]
pub struct ReloadConfig {
    /// How long the candidate has to report healthy before the reload is
    /// aborted.
    pub candidate_health_deadline: Duration,
    /// How long the outgoing active instance is given to drain in-flight
    /// work after being quiesced, before the terminate signal is sent.
    pub drain_deadline: Duration,
    /// How long the outgoing active instance is given to exit after the
    /// terminate signal before being killed.
    pub shutdown_deadline: Duration,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            candidate_health_deadline: Duration::from_secs(30),
            drain_deadline: Duration::from_secs(10),
            shutdown_deadline: Duration::from_secs(30),
        }
    }
}

/// Result of one reload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The candidate became healthy and was promoted to active.
    Promoted {
        /// The generation that is now active.
        generation: Generation,
        /// Its fingerprint, now recorded as `last-good`.
        fingerprint: Fingerprint,
    },
    /// The candidate never became healthy within the deadline; the prior
    /// active instance was left running unchanged.
    Aborted {
        /// Why the candidate was rejected.
        reason: String,
    },
    /// The new descriptor has the same fingerprint as the currently active
    /// one; no reload was necessary.
    NoOpSameFingerprint,
}
