// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! The declarative user-configuration schema and its validator.
//!
//! Deliberately hand-written rather than derived via reflection over a
//! generic document type: every accepted key is named here, and
//! `#[serde(deny_unknown_fields)]` rejects anything else rather than
//! silently ignoring it.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

static SERVICE_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("static pattern is valid"));

/// Top-level user configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserConfig {
    /// Required service identity section.
    pub service: ServiceSection,
    /// Metrics pipeline knobs.
    #[serde(default)]
    pub metrics: MetricsSection,
    /// Traces pipeline knobs.
    #[serde(default)]
    pub traces: TracesSection,
    /// Security (redaction) knobs.
    #[serde(default)]
    pub security: SecuritySection,
    /// Pipeline processing knobs (cardinality cap, etc).
    #[serde(default)]
    pub processing: ProcessingSection,
    /// Export destination knobs.
    #[serde(default)]
    pub export: ExportSection,
    /// Logging knobs.
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Required service identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSection {
    /// Service name: `^[A-Za-z0-9][A-Za-z0-9._-]*$`, 1-255 chars.
    pub name: String,
}

/// Metrics pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Whether the metrics pipeline is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Scrape/export interval, as a duration suffix string (`s|m|h`).
    #[serde(default = "default_metrics_interval")]
    pub interval: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_metrics_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_metrics_interval() -> String {
    "60s".to_string()
}

/// Traces pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TracesSection {
    /// Head-based sampling rate in `[0, 1]`.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
}

impl Default for TracesSection {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
        }
    }
}

fn default_sample_rate() -> f64 {
    0.1
}

/// Security (redaction) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecuritySection {
    /// Whether the `nrsecurity` redaction processor is installed.
    #[serde(default = "default_true")]
    pub redact_secrets: bool,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self { redact_secrets: true }
    }
}

/// Pipeline processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessingSection {
    /// Per-metric cardinality cap, in `[100, 100000]`.
    #[serde(default = "default_cardinality_limit")]
    pub cardinality_limit: u32,
}

impl Default for ProcessingSection {
    fn default() -> Self {
        Self {
            cardinality_limit: default_cardinality_limit(),
        }
    }
}

fn default_cardinality_limit() -> u32 {
    10_000
}

/// Which New Relic region an export endpoint defaults to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    Us,
    Eu,
}

impl Default for Region {
    fn default() -> Self {
        Self::Us
    }
}

/// Export destination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportSection {
    /// Export endpoint. When unset, derived from `region`.
    pub endpoint: Option<String>,
    /// Target region, adjusts the default endpoint.
    #[serde(default)]
    pub region: Region,
    /// Retry policy.
    #[serde(default)]
    pub retry: RetrySection,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: Region::default(),
            retry: RetrySection::default(),
        }
    }
}

/// Export retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    /// Maximum export attempts, in `[1, 10]`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

/// Logging level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Minimum emitted log level.
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

/// Canonical New Relic OTLP ingress endpoints per region.
#[must_use]
pub fn default_endpoint_for_region(region: Region) -> &'static str {
    match region {
        Region::Us => "otlp.nr-data.net:4317",
        Region::Eu => "otlp.eu01.nr-data.net:4317",
    }
}

/// Validates a parsed `UserConfig`, returning every offending field at once
/// rather than failing fast on the first.
pub fn validate(config: &UserConfig) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.service.name.is_empty() || config.service.name.len() > 255 {
        errors.push(ConfigError::InvalidConfig {
            field: "service.name".to_string(),
            reason: "must be 1-255 characters".to_string(),
        });
    } else if !SERVICE_NAME_PATTERN.is_match(&config.service.name) {
        errors.push(ConfigError::InvalidConfig {
            field: "service.name".to_string(),
            reason: format!(
                "must match pattern `^[A-Za-z0-9][A-Za-z0-9._-]*$`, got `{}`",
                config.service.name
            ),
        });
    }

    if let Err(reason) = parse_duration_suffix(&config.metrics.interval) {
        errors.push(ConfigError::InvalidConfig {
            field: "metrics.interval".to_string(),
            reason,
        });
    }

    if !(0.0..=1.0).contains(&config.traces.sample_rate) {
        errors.push(ConfigError::InvalidConfig {
            field: "traces.sample_rate".to_string(),
            reason: format!("must be in [0, 1], got {}", config.traces.sample_rate),
        });
    }

    if !(100..=100_000).contains(&config.processing.cardinality_limit) {
        errors.push(ConfigError::InvalidConfig {
            field: "processing.cardinality_limit".to_string(),
            reason: format!(
                "must be in [100, 100000], got {}",
                config.processing.cardinality_limit
            ),
        });
    }

    if !(1..=10).contains(&config.export.retry.max_attempts) {
        errors.push(ConfigError::InvalidConfig {
            field: "export.retry.max_attempts".to_string(),
            reason: format!(
                "must be in [1, 10], got {}",
                config.export.retry.max_attempts
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Multiple(errors))
    }
}

/// Parses a duration string limited to the `s|m|h` suffixes (e.g.
/// `"60s"`, `"5m"`, `"1h"`) — a subset of what `humantime::parse_duration`
/// accepts, so this first checks the shape before delegating the numeric
/// parse to `humantime`.
pub fn parse_duration_suffix(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    let Some(last) = trimmed.chars().last() else {
        return Err("empty duration".to_string());
    };
    if !matches!(last, 's' | 'm' | 'h') {
        return Err(format!("duration `{value}` must end in one of s|m|h"));
    }
    let digits = &trimmed[..trimmed.len() - 1];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("duration `{value}` must be a plain integer followed by s|m|h"));
    }
    humantime::parse_duration(trimmed).map_err(|e| format!("invalid duration `{value}`: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> UserConfig {
        UserConfig {
            service: ServiceSection { name: "api".to_string() },
            metrics: MetricsSection::default(),
            traces: TracesSection::default(),
            security: SecuritySection::default(),
            processing: ProcessingSection::default(),
            export: ExportSection::default(),
            logging: LoggingSection::default(),
        }
    }

    #[test]
    fn minimal_config_validates() {
        assert!(validate(&minimal()).is_ok());
    }

    #[test]
    fn rejects_bad_service_name() {
        let mut config = minimal();
        config.service.name = "bad name!".to_string();
        let err = validate(&config).unwrap_err();
        match err {
            ConfigError::Multiple(errors) => {
                assert!(errors.iter().any(|e| matches!(e, ConfigError::InvalidConfig { field, .. } if field == "service.name")));
            }
            other => panic!("expected Multiple, got {other:?}"),
        }
    }

    #[test]
    fn rejects_out_of_range_sample_rate() {
        let mut config = minimal();
        config.traces.sample_rate = 1.5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn duration_suffix_must_be_s_m_or_h() {
        assert!(parse_duration_suffix("30s").is_ok());
        assert!(parse_duration_suffix("5m").is_ok());
        assert!(parse_duration_suffix("1h").is_ok());
        assert!(parse_duration_suffix("30").is_err());
        assert!(parse_duration_suffix("30d").is_err());
    }
}
