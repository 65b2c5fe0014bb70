// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! `nrcap`: cardinality cap over metric series, applied after `nrtransform`
//! so derived series are capped alongside raw ones. Metric-only, mirroring
//! `nrtransform`.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use tracing::warn;

use nrdot_types::batch::TelemetryItem;
use nrdot_types::descriptor::PipelineKind;
use nrdot_types::{CardinalityKey, TelemetryBatch};

/// What happens to a series once its metric or global limit is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapStrategy {
    /// The new series is dropped outright.
    Drop,
    /// The new series is folded into a progressively less specific
    /// (attribute-stripped) rollup until an existing admitted key matches,
    /// falling back to a fully unlabeled rollup.
    Aggregate,
    /// The new series is admitted with probability proportional to the
    /// remaining global budget.
    Sample,
}

/// Construction-time configuration.
#[derive(Debug, Clone)]
pub struct CapConfig {
    /// Maximum distinct series per metric name. `None` means unlimited.
    pub per_metric_limit: Option<usize>,
    /// Maximum distinct series across all metrics. `None` means unlimited.
    pub global_limit: Option<usize>,
    /// What to do once a limit would be exceeded.
    pub strategy: CapStrategy,
    /// How often the membership sets (not the drop counters) are cleared,
    /// so series that later "earn" admission aren't starved forever by
    /// series that happened to arrive first in a long-lived process.
    pub refresh_window: Duration,
}

impl Default for CapConfig {
    fn default() -> Self {
        Self {
            per_metric_limit: None,
            global_limit: None,
            strategy: CapStrategy::Drop,
            refresh_window: Duration::from_secs(60 * 60),
        }
    }
}

struct State {
    per_metric_sets: HashMap<String, HashSet<CardinalityKey>>,
    global_set: HashSet<CardinalityKey>,
    drop_counters: HashMap<String, u64>,
    last_refresh: Instant,
}

impl Default for State {
    fn default() -> Self {
        Self {
            per_metric_sets: HashMap::new(),
            global_set: HashSet::new(),
            drop_counters: HashMap::new(),
            last_refresh: Instant::now(),
        }
    }
}

/// Cardinality-cap processor (`nrcap`).
pub struct CapProcessor {
    config: CapConfig,
    state: Mutex<State>,
}

/// Attribute keys tried, in decreasing specificity, when the `aggregate`
/// strategy needs to fold a new series into a less granular one. The cap
/// processor has no schema knowledge of which attributes are "important",
/// so it strips from the tail of the sorted attribute list inward — this
/// keeps the retained keys deterministic rather than guessing semantics.
fn progressively_stripped_keys(key: &CardinalityKey) -> Vec<Vec<&str>> {
    let all_keys: Vec<&str> = key.attributes.iter().map(|(k, _)| k.as_str()).collect();
    let mut variants = Vec::new();
    for keep_count in (0..all_keys.len()).rev() {
        variants.push(all_keys[..keep_count].to_vec());
    }
    variants
}

impl CapProcessor {
    /// Builds a processor from its configuration.
    #[must_use]
    pub fn new(config: CapConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
        }
    }

    /// Cumulative per-metric drop counts so far (for status/metrics
    /// reporting), keyed by metric name.
    #[must_use]
    pub fn drop_counters(&self) -> HashMap<String, u64> {
        self.state.lock().drop_counters.clone()
    }

    fn maybe_refresh(&self, state: &mut State) {
        if state.last_refresh.elapsed() >= self.config.refresh_window {
            state.per_metric_sets.clear();
            state.global_set.clear();
            state.last_refresh = Instant::now();
        }
    }

    /// Applies the configured cap to every metric data point in `batch`.
    /// Non-metric items and non-metrics batches pass through untouched.
    pub fn process(&self, batch: &mut TelemetryBatch) {
        if batch.kind != Some(PipelineKind::Metrics) {
            return;
        }
        if self.config.per_metric_limit.is_none() && self.config.global_limit.is_none() {
            return;
        }

        let mut state = self.state.lock();
        self.maybe_refresh(&mut state);

        batch.items.retain_mut(|scoped| {
            let TelemetryItem::Metric(point) = &mut scoped.item else { return true };
            let key = CardinalityKey::new(&point.name, &point.attributes);
            self.admit(&mut state, &point.name, key, point)
        });
    }

    /// Decides whether one data point's series is admitted, and mutates the
    /// point in place if the `aggregate` strategy folds it into a less
    /// specific series. Returns `false` if the caller should drop the item
    /// entirely.
    fn admit(&self, state: &mut State, metric_name: &str, key: CardinalityKey, point: &mut nrdot_types::batch::MetricDataPoint) -> bool {
        let per_metric_set = state.per_metric_sets.entry(metric_name.to_string()).or_default();
        if per_metric_set.contains(&key) && state.global_set.contains(&key) {
            return true;
        }

        let per_metric_room = self.config.per_metric_limit.is_none_or(|limit| per_metric_set.len() < limit);
        let global_room = self.config.global_limit.is_none_or(|limit| state.global_set.len() < limit);

        if per_metric_room && global_room {
            per_metric_set.insert(key.clone());
            state.global_set.insert(key);
            return true;
        }

        match self.config.strategy {
            CapStrategy::Drop => {
                *state.drop_counters.entry(metric_name.to_string()).or_insert(0) += 1;
                false
            }
            CapStrategy::Aggregate => {
                for keep_keys in progressively_stripped_keys(&key) {
                    let candidate = key.with_keys_retained(&keep_keys);
                    if state.global_set.contains(&candidate) {
                        point.attributes.retain(|k, _| keep_keys.contains(&k.as_str()));
                        return true;
                    }
                }
                // No existing rollup matched either; admit this as the new
                // fully-stripped rollup for the metric so later series have
                // something to fold into.
                let rollup_key = key.with_keys_retained(&[]);
                point.attributes.clear();
                state.global_set.insert(rollup_key.clone());
                state.per_metric_sets.entry(metric_name.to_string()).or_default().insert(rollup_key);
                true
            }
            CapStrategy::Sample => {
                let remaining_budget = self
                    .config
                    .global_limit
                    .map(|limit| {
                        let used = state.global_set.len().min(limit) as f64;
                        (1.0 - used / limit as f64).clamp(0.0, 1.0)
                    })
                    .unwrap_or(0.0);
                let admitted = rand::rng().random_range(0.0..1.0) < remaining_budget;
                if admitted {
                    state.per_metric_sets.entry(metric_name.to_string()).or_default().insert(key.clone());
                    state.global_set.insert(key);
                } else {
                    *state.drop_counters.entry(metric_name.to_string()).or_insert(0) += 1;
                    warn!(metric = metric_name, "series sampled out by cardinality cap");
                }
                admitted
            }
        }
    }
}
