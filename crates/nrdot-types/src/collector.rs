// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! `CollectorInstance`: the supervisor's view of one embedded collector
//! child process.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::descriptor::Generation;

/// Health state of a `CollectorInstance`, as tracked by the supervisor's
/// health-monitor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Spawned, not yet confirmed healthy.
    Starting,
    /// Passed the required consecutive health probes.
    Healthy,
    /// Failed the configured number of consecutive health probes.
    Unhealthy,
    /// Being stopped as part of a blue/green promotion or shutdown.
    Terminating,
    /// Process has exited.
    Exited,
}

/// Why a `CollectorInstance` stopped running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCause {
    /// Stopped cleanly via the supervisor's terminate signal.
    Terminated,
    /// Exited on its own with the given status code.
    Exited {
        /// Process exit code, if the OS reported one.
        code: Option<i32>,
    },
    /// Did not exit within the shutdown deadline and was killed (process
    /// group signal).
    Killed,
    /// The supervisor lost track of the child (e.g. after a supervisor
    /// restart found no matching orphan).
    Lost,
    /// Exceeded the configured memory ceiling for the configured window.
    MemoryCeiling,
}

/// The supervisor's handle on one embedded collector process.
#[derive(Debug, Clone)]
pub struct CollectorInstance {
    /// Generation of the `PipelineDescriptor` this instance was started
    /// with.
    pub generation: Generation,
    /// OS process id.
    pub pid: u32,
    /// Process-group id (collector and any of its own children share this,
    /// so a kill can target the whole group).
    pub pgid: u32,
    /// When this instance was spawned.
    pub started_at: Instant,
    /// Current health state.
    pub health: HealthState,
    /// Cumulative restarts attributed to this logical slot (active or
    /// candidate) since the supervisor started.
    pub restart_count: u32,
    /// Why the instance last exited, if it has.
    pub last_exit_cause: Option<ExitCause>,
    /// Consecutive failed health probes observed so far (reset to 0 on a
    /// success; compared against `N` to transition to `Unhealthy`).
    pub consecutive_health_failures: u32,
}

impl CollectorInstance {
    /// Constructs a freshly spawned instance in the `Starting` state.
    #[must_use]
    pub fn spawned(generation: Generation, pid: u32, pgid: u32, started_at: Instant) -> Self {
        Self {
            generation,
            pid,
            pgid,
            started_at,
            health: HealthState::Starting,
            restart_count: 0,
            last_exit_cause: None,
            consecutive_health_failures: 0,
        }
    }

    /// Records a successful health probe: resets the failure streak and, if
    /// still `Starting`, promotes to `Healthy`.
    pub fn record_health_success(&mut self) {
        self.consecutive_health_failures = 0;
        if matches!(self.health, HealthState::Starting | HealthState::Unhealthy) {
            self.health = HealthState::Healthy;
        }
    }

    /// Records a failed health probe. Transitions to `Unhealthy` once
    /// `consecutive_health_failures` reaches `threshold`.
    pub fn record_health_failure(&mut self, threshold: u32) {
        self.consecutive_health_failures = self.consecutive_health_failures.saturating_add(1);
        if self.consecutive_health_failures >= threshold {
            self.health = HealthState::Unhealthy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_transitions_starting_to_healthy_to_unhealthy() {
        let mut inst = CollectorInstance::spawned(Generation(1), 100, 100, Instant::now());
        assert_eq!(inst.health, HealthState::Starting);
        inst.record_health_success();
        assert_eq!(inst.health, HealthState::Healthy);
        inst.record_health_failure(3);
        inst.record_health_failure(3);
        assert_eq!(inst.health, HealthState::Healthy);
        inst.record_health_failure(3);
        assert_eq!(inst.health, HealthState::Unhealthy);
    }

    #[test]
    fn health_success_resets_failure_streak_and_recovers() {
        let mut inst = CollectorInstance::spawned(Generation(1), 100, 100, Instant::now());
        inst.record_health_success();
        inst.record_health_failure(3);
        inst.record_health_failure(3);
        inst.record_health_failure(3);
        assert_eq!(inst.health, HealthState::Unhealthy);
        inst.record_health_success();
        assert_eq!(inst.health, HealthState::Healthy);
        assert_eq!(inst.consecutive_health_failures, 0);
    }
}
