// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Health monitoring: periodic short-deadline probes of the collector's
//! local health endpoint.

use std::time::Duration;

use tracing::debug;

/// Health-probe configuration.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// How often a probe is attempted.
    pub interval: Duration,
    /// Per-probe request deadline.
    pub probe_deadline: Duration,
    /// Consecutive failures required to mark an instance unhealthy.
    pub failure_threshold: u32,
    /// Port the collector's health endpoint listens on.
    pub port: u16,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            probe_deadline: Duration::from_secs(5),
            failure_threshold: 3,
            port: 13133,
        }
    }
}

/// Performs one health probe against `http://127.0.0.1:<port>/health`,
/// honoring the configured deadline. Returns `true` on any `2xx` response
/// within the deadline; any other outcome (non-2xx, timeout, connection
/// refused) counts as a failed probe.
pub async fn probe_once(client: &reqwest::Client, config: &HealthCheckConfig) -> bool {
    let url = format!("http://127.0.0.1:{}/health", config.port);
    let result = client.get(&url).timeout(config.probe_deadline).send().await;
    match result {
        Ok(response) if response.status().is_success() => true,
        Ok(response) => {
            debug!(status = %response.status(), %url, "health probe returned non-success status");
            false
        }
        Err(e) => {
            debug!(error = %e, %url, "health probe failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probe_against_closed_port_fails() {
        let client = reqwest::Client::new();
        let config = HealthCheckConfig {
            port: 1, // privileged, never bound in test environments
            probe_deadline: Duration::from_millis(200),
            ..HealthCheckConfig::default()
        };
        assert!(!probe_once(&client, &config).await);
    }

    #[test]
    fn default_thresholds_match_documented_defaults() {
        let config = HealthCheckConfig::default();
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.probe_deadline, Duration::from_secs(5));
        assert_eq!(config.failure_threshold, 3);
    }
}
