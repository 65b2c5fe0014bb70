// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Incremental scan classification: given the
//! previous scan's facts, classifies each currently-observed process as
//! appeared, departed, changed, or unchanged, so callers that poll tightly
//! (the supervisor's resource-accounting loop) can skip re-deriving
//! everything for processes whose material stats haven't moved.

use std::collections::HashMap;

use nrdot_types::ProcessFact;

/// How a process changed between two scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    /// Not present in the previous scan.
    Appeared,
    /// Present previously, absent now.
    Departed,
    /// Present in both, but cpu/rss moved beyond the configured thresholds.
    Changed,
    /// Present in both, materially unchanged.
    Unchanged,
}

/// Thresholds controlling what counts as "materially changed".
#[derive(Debug, Clone, Copy)]
pub struct DeltaThresholds {
    /// Absolute CPU-percentage-point delta that counts as material.
    pub cpu_change_threshold: f64,
    /// Fractional RSS delta (relative to the previous value) that counts as
    /// material.
    pub rss_change_fraction: f64,
}

impl Default for DeltaThresholds {
    fn default() -> Self {
        Self {
            cpu_change_threshold: 5.0,
            rss_change_fraction: 0.10,
        }
    }
}

/// One process's classification, with its current fact (if still present).
#[derive(Debug, Clone)]
pub struct ProcessDelta {
    /// The pid this delta describes.
    pub pid: u32,
    /// Classification against the previous scan.
    pub kind: DeltaKind,
    /// The current fact, present for everything but `Departed`.
    pub current: Option<ProcessFact>,
}

/// Computes deltas for `current` against `previous`, using `thresholds` to
/// decide `Changed` vs `Unchanged`. Every pid in either set appears exactly
/// once in the result.
#[must_use]
pub fn classify(
    previous: &[ProcessFact],
    current: &[ProcessFact],
    thresholds: DeltaThresholds,
) -> Vec<ProcessDelta> {
    let prev_by_pid: HashMap<u32, &ProcessFact> = previous.iter().map(|f| (f.pid, f)).collect();
    let curr_by_pid: HashMap<u32, &ProcessFact> = current.iter().map(|f| (f.pid, f)).collect();

    let mut deltas = Vec::with_capacity(prev_by_pid.len().max(curr_by_pid.len()));

    for fact in current {
        match prev_by_pid.get(&fact.pid) {
            None => deltas.push(ProcessDelta {
                pid: fact.pid,
                kind: DeltaKind::Appeared,
                current: Some(fact.clone()),
            }),
            Some(prev) => {
                let cpu_delta = (fact.cpu_percent - prev.cpu_percent).abs();
                let rss_delta_fraction = if prev.rss_bytes == 0 {
                    if fact.rss_bytes == 0 { 0.0 } else { 1.0 }
                } else {
                    (fact.rss_bytes as f64 - prev.rss_bytes as f64).abs() / prev.rss_bytes as f64
                };
                let changed = cpu_delta > thresholds.cpu_change_threshold
                    || rss_delta_fraction > thresholds.rss_change_fraction;
                deltas.push(ProcessDelta {
                    pid: fact.pid,
                    kind: if changed { DeltaKind::Changed } else { DeltaKind::Unchanged },
                    current: Some(fact.clone()),
                });
            }
        }
    }

    for fact in previous {
        if !curr_by_pid.contains_key(&fact.pid) {
            deltas.push(ProcessDelta {
                pid: fact.pid,
                kind: DeltaKind::Departed,
                current: None,
            });
        }
    }

    deltas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(pid: u32, cpu: f64, rss: u64) -> ProcessFact {
        ProcessFact {
            pid,
            ppid: 1,
            executable: "x".into(),
            command_line: "x".into(),
            uid: 0,
            start_time_ticks: 0,
            rss_bytes: rss,
            vsize_bytes: 0,
            thread_count: 1,
            open_file_count: None,
            cpu_time_secs: 0.0,
            cpu_percent: cpu,
        }
    }

    #[test]
    fn classifies_appeared_departed_changed_unchanged() {
        let previous = vec![fact(1, 10.0, 1000), fact(2, 1.0, 500)];
        let current = vec![fact(1, 10.5, 1000), fact(3, 50.0, 2000)];
        let deltas = classify(&previous, &current, DeltaThresholds::default());

        let find = |pid: u32| deltas.iter().find(|d| d.pid == pid).unwrap().kind;
        assert_eq!(find(1), DeltaKind::Unchanged);
        assert_eq!(find(2), DeltaKind::Departed);
        assert_eq!(find(3), DeltaKind::Appeared);
    }

    #[test]
    fn large_cpu_delta_is_changed() {
        let previous = vec![fact(1, 1.0, 1000)];
        let current = vec![fact(1, 90.0, 1000)];
        let deltas = classify(&previous, &current, DeltaThresholds::default());
        assert_eq!(deltas[0].kind, DeltaKind::Changed);
    }
}
