// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Short-TTL cache over discovery results so the
//! config engine's render path and the `/v1/discovery` control endpoint
//! don't each force a fresh four-scanner fan-out.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::DiscoveryResult;

/// Caches the most recent `DiscoveryResult` for `ttl`.
pub struct DiscoveryCache {
    ttl: Duration,
    entry: Mutex<Option<(Instant, DiscoveryResult)>>,
}

impl DiscoveryCache {
    /// Creates a cache with the given TTL (default 30s).
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// Returns a fresh cached result, if one exists within the TTL.
    #[must_use]
    pub fn get(&self) -> Option<DiscoveryResult> {
        let guard = self.entry.lock();
        guard.as_ref().and_then(|(cached_at, result)| {
            if cached_at.elapsed() < self.ttl {
                Some(result.clone())
            } else {
                None
            }
        })
    }

    /// Stores a fresh result, stamped with the current time.
    pub fn put(&self, result: DiscoveryResult) {
        *self.entry.lock() = Some((Instant::now(), result));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScannerError;

    #[test]
    fn serves_from_cache_within_ttl_and_expires_after() {
        let cache = DiscoveryCache::new(Duration::from_millis(20));
        assert!(cache.get().is_none());
        cache.put(DiscoveryResult {
            services: Vec::new(),
            errors: Vec::<ScannerError>::new(),
        });
        assert!(cache.get().is_some());
        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get().is_none());
    }
}
