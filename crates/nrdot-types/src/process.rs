// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! `ProcessFact`: an immutable snapshot of one process, produced by a single
//! scan of the process-information filesystem.

use serde::{Deserialize, Serialize};

/// A snapshot of one running process as of a single scan.
///
/// Created fresh on each scan; never mutated afterward. Dropped once the
/// scan that superseded it completes (see `nrdot-process::scan`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessFact {
    /// Process id.
    pub pid: u32,
    /// Parent process id.
    pub ppid: u32,
    /// Executable name (the `comm` field, without path or arguments).
    pub executable: String,
    /// Full command line, byte-limited (see `nrdot-process` for the cap).
    pub command_line: String,
    /// Effective user id owning the process.
    pub uid: u32,
    /// Process start time, in seconds since boot (kernel clock ticks
    /// normalized), used only to disambiguate PID reuse — not a wall clock.
    pub start_time_ticks: u64,
    /// Resident set size, in bytes.
    pub rss_bytes: u64,
    /// Virtual memory size, in bytes.
    pub vsize_bytes: u64,
    /// Number of threads.
    pub thread_count: u32,
    /// Number of open file descriptors, if readable.
    pub open_file_count: Option<u32>,
    /// Cumulative CPU time consumed, in seconds (utime + stime).
    pub cpu_time_secs: f64,
    /// CPU percent derived from the delta against the previous scan's
    /// cumulative CPU time, divided by elapsed wall time. `0.0` for a
    /// process observed for the first time (no prior sample to diff
    /// against).
    pub cpu_percent: f64,
}

impl ProcessFact {
    /// Rank key for top-N-by-CPU selection: descending CPU percent, with
    /// resident memory as a tie-breaker so output ordering is stable across
    /// scans when CPU usage is identical (common for idle processes).
    #[must_use]
    pub fn cpu_rank_key(&self) -> (ordered_f64::OrderedF64, u64) {
        (ordered_f64::OrderedF64(self.cpu_percent), self.rss_bytes)
    }

    /// Rank key for top-N-by-memory selection.
    #[must_use]
    pub fn memory_rank_key(&self) -> u64 {
        self.rss_bytes
    }
}

/// Minimal total-ordering wrapper over `f64` for sort keys. Process CPU
/// percentages are always finite (never NaN — derived from non-negative
/// tick counts and non-zero wall-clock deltas), so a `PartialOrd`-to-`Ord`
/// promotion is safe here without pulling in a crate dependency for it.
pub mod ordered_f64 {
    use std::cmp::Ordering;

    /// See module docs.
    #[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
    pub struct OrderedF64(pub f64);

    impl Eq for OrderedF64 {}

    impl Ord for OrderedF64 {
        fn cmp(&self, other: &Self) -> Ordering {
            self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(cpu: f64, rss: u64) -> ProcessFact {
        ProcessFact {
            pid: 1,
            ppid: 0,
            executable: "test".into(),
            command_line: "test".into(),
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
    fn cpu_rank_key_orders_descending_by_cpu_then_rss() {
        let a = fact(10.0, 100);
        let b = fact(10.0, 200);
        let c = fact(5.0, 900);
        let mut v = vec![a.clone(), b.clone(), c.clone()];
        v.sort_by(|x, y| y.cpu_rank_key().cmp(&x.cpu_rank_key()));
        assert_eq!(v[0], b);
        assert_eq!(v[1], a);
        assert_eq!(v[2], c);
    }
}
