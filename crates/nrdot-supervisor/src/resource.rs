// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Resource accounting: tracks a collector instance's resident memory
//! against an optional ceiling, triggering a `memory_ceiling` restart once
//! the ceiling has been exceeded continuously for a configured window.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nrdot_process::{read_single, CpuTickCache};

use crate::error::SupervisorError;

/// Optional memory-ceiling policy.
#[derive(Debug, Clone)]
pub struct MemoryCeilingConfig {
    /// Resident-memory ceiling, in bytes. `None` disables the check
    /// entirely.
    pub ceiling_bytes: Option<u64>,
    /// How long the ceiling must be exceeded continuously before the
    /// instance is restarted.
    pub window: Duration,
}

impl Default for MemoryCeilingConfig {
    fn default() -> Self {
        Self {
            ceiling_bytes: None,
            window: Duration::from_secs(60),
        }
    }
}

/// Tracks how long a single instance has been continuously over its
/// memory ceiling.
pub struct ResourceTracker {
    proc_root: PathBuf,
    cache: CpuTickCache,
    over_ceiling_since: Option<Instant>,
}

impl ResourceTracker {
    /// Builds a tracker rooted at `proc_root` (normally `/proc`).
    #[must_use]
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            cache: CpuTickCache::new(),
            over_ceiling_since: None,
        }
    }

    /// Reads the instance's current resident memory, in bytes.
    pub fn read_rss_bytes(&mut self, pid: u32) -> Result<u64, SupervisorError> {
        let fact = read_single(&self.proc_root, pid, &mut self.cache).map_err(|e| SupervisorError::ResourceReadFailed { pid, reason: e.reason })?;
        Ok(fact.rss_bytes)
    }

    /// Updates the continuous-over-ceiling tracking for one sample and
    /// reports whether the ceiling has now been exceeded for at least the
    /// configured window (i.e. whether the caller should restart the
    /// instance with cause `memory_ceiling`).
    pub fn observe(&mut self, rss_bytes: u64, config: &MemoryCeilingConfig, now: Instant) -> bool {
        let Some(ceiling) = config.ceiling_bytes else {
            self.over_ceiling_since = None;
            return false;
        };

        if rss_bytes <= ceiling {
            self.over_ceiling_since = None;
            return false;
        }

        let since = *self.over_ceiling_since.get_or_insert(now);
        now.saturating_duration_since(since) >= config.window
    }

    /// Resets the continuous-over-ceiling tracking, e.g. after a restart.
    pub fn reset(&mut self) {
        self.over_ceiling_since = None;
    }
}

/// Convenience constructor using the canonical `/proc` root.
#[must_use]
pub fn default_tracker() -> ResourceTracker {
    ResourceTracker::new(Path::new("/proc"))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write_proc_entry(root: &Path, pid: u32, rss_pages: u64) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        let stat = format!("{pid} (child) S 1 1 1 0 -1 0 0 0 0 0 10 5 0 0 20 0 1 0 100 4096000 {rss_pages} 0 0");
        fs::write(dir.join("stat"), stat).unwrap();
        fs::write(dir.join("status"), "Uid:\t0\t0\t0\t0\n").unwrap();
        fs::write(dir.join("cmdline"), "child\0").unwrap();
    }

    #[test]
    fn under_ceiling_never_triggers() {
        let config = MemoryCeilingConfig {
            ceiling_bytes: Some(1_000_000),
            window: Duration::from_secs(10),
        };
        let mut tracker = ResourceTracker::new(Path::new("/unused"));
        let now = Instant::now();
        assert!(!tracker.observe(500_000, &config, now));
    }

    #[test]
    fn exceeding_ceiling_only_triggers_after_the_window_elapses() {
        let config = MemoryCeilingConfig {
            ceiling_bytes: Some(1_000_000),
            window: Duration::from_secs(10),
        };
        let mut tracker = ResourceTracker::new(Path::new("/unused"));
        let start = Instant::now();
        assert!(!tracker.observe(2_000_000, &config, start));
        assert!(!tracker.observe(2_000_000, &config, start + Duration::from_secs(5)));
        assert!(tracker.observe(2_000_000, &config, start + Duration::from_secs(11)));
    }

    #[test]
    fn dropping_back_under_ceiling_resets_the_window() {
        let config = MemoryCeilingConfig {
            ceiling_bytes: Some(1_000_000),
            window: Duration::from_secs(10),
        };
        let mut tracker = ResourceTracker::new(Path::new("/unused"));
        let start = Instant::now();
        assert!(!tracker.observe(2_000_000, &config, start));
        assert!(!tracker.observe(500_000, &config, start + Duration::from_secs(5)));
        assert!(!tracker.observe(2_000_000, &config, start + Duration::from_secs(11)));
    }

    #[test]
    fn disabled_ceiling_never_triggers() {
        let config = MemoryCeilingConfig::default();
        let mut tracker = ResourceTracker::new(Path::new("/unused"));
        assert!(!tracker.observe(u64::MAX, &config, Instant::now()));
    }

    #[test]
    fn read_rss_bytes_reads_from_proc_root() {
        let tmp = tempfile::tempdir().unwrap();
        write_proc_entry(tmp.path(), 42, 256);
        let mut tracker = ResourceTracker::new(tmp.path());
        let rss = tracker.read_rss_bytes(42).unwrap();
        assert_eq!(rss, 256 * 4096);
    }
}
