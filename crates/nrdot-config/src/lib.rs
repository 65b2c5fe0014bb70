// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! The configuration engine: validates user configuration, renders
//! auto-discovered service fragments, merges both into a signed
//! `PipelineDescriptor`, and keeps a short rollback ring of prior
//! generations.

pub mod error;
pub mod merge;
pub mod placeholder;
pub mod render;
pub mod schema;
pub mod templates;

use std::collections::VecDeque;

use nrdot_discovery::DiscoveryResult;
use nrdot_types::descriptor::{Generation, PipelineDescriptor};
use tracing::{debug, info, warn};

pub use error::{ConfigError, ConfigWarning};
pub use schema::UserConfig;

/// How many prior generations the engine keeps for rollback.
const ROLLBACK_RING_SIZE: usize = 5;

/// The outcome of a rendering pass: the descriptor plus any non-fatal
/// warnings (unresolved placeholders, low-confidence discovery dropped).
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    /// The newly rendered descriptor.
    pub descriptor: PipelineDescriptor,
    /// Non-fatal warnings collected along the way.
    pub warnings: Vec<ConfigWarning>,
}

/// Owns generation numbering and the rollback ring. One instance lives for
/// the collector process's whole lifetime; the supervisor calls `render`
/// whenever user configuration or discovery output changes.
pub struct ConfigEngine {
    next_generation: Generation,
    history: VecDeque<PipelineDescriptor>,
}

impl Default for ConfigEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigEngine {
    /// Creates an engine with no rendered history. The first call to
    /// `render` produces generation 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_generation: Generation::default().next(),
            history: VecDeque::with_capacity(ROLLBACK_RING_SIZE),
        }
    }

    /// Parses, resolves placeholders in, validates, renders, and merges a
    /// raw YAML configuration document plus the current discovery result
    /// into a new descriptor.
    ///
    /// On success, the returned descriptor is pushed onto the rollback
    /// ring (evicting the oldest entry once it holds more than
    /// `ROLLBACK_RING_SIZE`). Validation failures do not advance the
    /// generation counter or touch the ring — a rejected candidate config
    /// leaves the engine's state untouched.
    pub fn render(&mut self, raw_yaml: &str, discovery: &DiscoveryResult) -> Result<RenderOutcome, ConfigError> {
        let (resolved_yaml, warnings) = placeholder::resolve(raw_yaml);

        let config: UserConfig =
            serde_yaml::from_str(&resolved_yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        schema::validate(&config)?;

        for err in &discovery.errors {
            warn!(scanner = err.scanner, message = %err.message, "discovery scanner failed during render");
        }

        let rendered_services = render::render_discovered(&discovery.services)?;
        let dropped = discovery.services.len() - rendered_services.len();
        if dropped > 0 {
            debug!(dropped, "low-confidence discovered services excluded from render");
        }

        let generation = self.next_generation;
        let descriptor = merge::merge(&config, &rendered_services, generation);

        if let Some(previous) = self.history.back() {
            if previous.fingerprint == descriptor.fingerprint {
                debug!(%generation, "rendered descriptor is a no-op relative to the previous generation");
            }
        }

        info!(%generation, fingerprint = %descriptor.fingerprint, services = rendered_services.len(), "rendered pipeline descriptor");

        self.next_generation = generation.next();
        if self.history.len() == ROLLBACK_RING_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(descriptor.clone());

        Ok(RenderOutcome { descriptor, warnings })
    }

    /// Validates a raw configuration document without rendering or
    /// advancing engine state (the `nrdot validate` CLI path and the
    /// control API's `dry_run` flag).
    pub fn validate_only(raw_yaml: &str) -> Result<Vec<ConfigWarning>, ConfigError> {
        let (resolved_yaml, warnings) = placeholder::resolve(raw_yaml);
        let config: UserConfig =
            serde_yaml::from_str(&resolved_yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        schema::validate(&config)?;
        Ok(warnings)
    }

    /// The most recently rendered descriptor, if any.
    #[must_use]
    pub fn current(&self) -> Option<&PipelineDescriptor> {
        self.history.back()
    }

    /// Rolls back to the descriptor `generations_back` entries before the
    /// current one (`1` means the immediately preceding generation).
    /// Returns `None` if the ring doesn't hold that many entries.
    #[must_use]
    pub fn rollback(&self, generations_back: usize) -> Option<&PipelineDescriptor> {
        if generations_back == 0 || generations_back > self.history.len() {
            return None;
        }
        self.history.get(self.history.len() - generations_back)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        "service:\n  name: api\n"
    }

    fn empty_discovery() -> DiscoveryResult {
        DiscoveryResult {
            services: Vec::new(),
            errors: Vec::new(),
        }
    }

    #[test]
    fn render_advances_generation_and_fills_ring() {
        let mut engine = ConfigEngine::new();
        let discovery = empty_discovery();
        let first = engine.render(minimal_yaml(), &discovery).unwrap();
        assert_eq!(first.descriptor.generation, Generation(1));
        let second = engine.render(minimal_yaml(), &discovery).unwrap();
        assert_eq!(second.descriptor.generation, Generation(2));
        assert_eq!(first.descriptor.fingerprint, second.descriptor.fingerprint);
    }

    #[test]
    fn invalid_config_does_not_advance_generation() {
        let mut engine = ConfigEngine::new();
        let discovery = empty_discovery();
        engine.render(minimal_yaml(), &discovery).unwrap();
        let bad = "service:\n  name: \"bad name!\"\n";
        assert!(engine.render(bad, &discovery).is_err());
        // Still at generation 1 from the first successful render.
        assert_eq!(engine.current().unwrap().generation, Generation(1));
    }

    #[test]
    fn rollback_ring_is_capped() {
        let mut engine = ConfigEngine::new();
        let discovery = empty_discovery();
        for _ in 0..(ROLLBACK_RING_SIZE + 3) {
            engine.render(minimal_yaml(), &discovery).unwrap();
        }
        assert_eq!(engine.history.len(), ROLLBACK_RING_SIZE);
        assert!(engine.rollback(ROLLBACK_RING_SIZE).is_some());
        assert!(engine.rollback(ROLLBACK_RING_SIZE + 1).is_none());
    }

    #[test]
    fn validate_only_does_not_touch_engine_state() {
        let warnings = ConfigEngine::validate_only(minimal_yaml()).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn parse_error_is_distinct_from_validation_error() {
        let err = ConfigEngine::validate_only(":::not yaml:::").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
