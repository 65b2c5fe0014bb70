// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! `nrtransform`: metric-only derivation (rate, delta, aggregation, unit
//! conversion, combination, rename, filter, label extraction) over the
//! in-process batch. Non-metric items pass through untouched; a non-metrics
//! batch is a no-op for this processor (the registry already skips it, but
//! `process` is defensive about it too).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use tracing::warn;

use nrdot_types::batch::{MetricDataPoint, TelemetryItem};
use nrdot_types::TelemetryBatch;

/// How long a cached per-series sample is kept before it's considered stale
/// and evicted rather than used as the "previous" point for rate/delta.
/// Fixed at twice the scrape interval: a gap larger than that means a
/// scrape was missed and the old sample is no longer a meaningful
/// comparison point.
#[must_use]
pub fn cache_ttl_for_scrape_interval(scrape_interval: Duration) -> Duration {
    scrape_interval.saturating_mul(2)
}

/// A grouping/aggregation function applied across the data points matching
/// `group_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    /// Sum of all matching values.
    Sum,
    /// Arithmetic mean of all matching values.
    Avg,
    /// Minimum matching value.
    Min,
    /// Maximum matching value.
    Max,
    /// Number of matching data points.
    Count,
}

impl AggregateFunction {
    fn apply(self, values: &[f64]) -> f64 {
        match self {
            Self::Sum => values.iter().sum(),
            Self::Avg => {
                if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                }
            }
            Self::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            Self::Count => values.len() as f64,
        }
    }
}

/// A single transform operation. One `TransformRule` wraps one `op` plus
/// the metric name it emits under.
#[derive(Debug, Clone)]
pub enum TransformOp {
    /// Groups `input_metric`'s data points by the listed attribute keys and
    /// reduces each group with `function`.
    Aggregate {
        /// Source metric name.
        input_metric: String,
        /// Attribute keys to group by; points missing a key fall into a
        /// group keyed by an empty string for that position.
        group_by: Vec<String>,
        /// Reduction function.
        function: AggregateFunction,
    },
    /// Per-series rate of change, in units per second, computed against the
    /// last cached sample for the same series identity.
    Rate {
        /// Source metric name (must be a monotonic sum/counter to be
        /// meaningful; the processor does not enforce this).
        input_metric: String,
    },
    /// Per-series difference from the last cached sample.
    Delta {
        /// Source metric name.
        input_metric: String,
    },
    /// Scales every matching value by a fixed factor and relabels the unit.
    UnitConversion {
        /// Source metric name.
        input_metric: String,
        /// Multiplicative factor applied to the value.
        factor: f64,
        /// New unit string.
        to_unit: String,
    },
    /// Renames a metric in place (no value change).
    Rename {
        /// Source metric name.
        input_metric: String,
    },
    /// Keeps or drops individual series within one metric by attribute
    /// value, without renaming.
    Filter {
        /// Source metric name.
        input_metric: String,
        /// If non-empty, only series whose `key` attribute is in this set
        /// survive.
        include_values: Vec<String>,
        /// The attribute key `include_values`/`exclude_values` are checked
        /// against.
        key: String,
        /// Series whose `key` attribute is in this set are dropped, checked
        /// after `include_values`.
        exclude_values: Vec<String>,
    },
    /// Produces a new series from a binary arithmetic expression over two
    /// named input metrics. §4.5.3: "inputs must share the same attribute
    /// tuple at the same timestamp" — pairs are matched on exactly that
    /// (series key, timestamp) identity; unmatched points on either side
    /// are silently skipped, since there is nothing to combine them with.
    Combine {
        /// Left-hand input metric name.
        lhs_metric: String,
        /// Right-hand input metric name.
        rhs_metric: String,
        /// Arithmetic operation applied as `lhs op rhs`.
        op: CombineOp,
    },
    /// Promotes a regex capture group taken from either an existing
    /// attribute value or the metric name itself into a new attribute.
    ExtractLabel {
        /// Source metric name.
        input_metric: String,
        /// Attribute to extract from; `None` extracts from the metric name.
        source_attribute: Option<String>,
        /// Regex with exactly one capture group; points whose source text
        /// doesn't match are left without the new label.
        pattern: String,
        /// Attribute key the capture is stored under.
        target_label: String,
    },
}

/// Binary arithmetic operation used by `TransformOp::Combine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineOp {
    Add,
    Subtract,
    Multiply,
    /// Division; a zero denominator produces a skipped (not emitted) point
    /// rather than an infinite/NaN value.
    Divide,
}

impl CombineOp {
    fn apply(self, lhs: f64, rhs: f64) -> Option<f64> {
        match self {
            Self::Add => Some(lhs + rhs),
            Self::Subtract => Some(lhs - rhs),
            Self::Multiply => Some(lhs * rhs),
            Self::Divide => {
                if rhs == 0.0 {
                    None
                } else {
                    Some(lhs / rhs)
                }
            }
        }
    }
}

/// One configured transform: an operation plus the name its output is
/// published under, and whether that output replaces the input series in
/// the batch or is added alongside it.
#[derive(Debug, Clone)]
pub struct TransformRule {
    /// The operation to apply.
    pub op: TransformOp,
    /// Name the derived metric is emitted as.
    pub output_metric: String,
    /// If `true`, the input series is removed from the batch once the
    /// derived metric has been produced from it (e.g. `rename`/`rate`
    /// commonly replace; `aggregate` commonly does not, since the raw
    /// series is still wanted downstream).
    pub replace_input: bool,
}

#[derive(Debug, Clone, Copy)]
struct CachedSample {
    value: f64,
    timestamp_unix_nanos: u64,
    last_seen: Instant,
}

type SeriesKey = Vec<(String, String)>;

/// Sharded, per-metric-name cache of the last-seen sample for every series
/// identity, used by `rate`/`delta`. Sharding by metric name (rather than
/// one global lock) means a transform on `cpu.usage` never contends with
/// one on `memory.usage` running concurrently on another worker.
#[derive(Default)]
pub struct SeriesCache {
    shards: RwLock<HashMap<String, Arc<Mutex<HashMap<SeriesKey, CachedSample>>>>>,
}

impl SeriesCache {
    /// Builds an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn shard(&self, metric_name: &str) -> Arc<Mutex<HashMap<SeriesKey, CachedSample>>> {
        if let Some(shard) = self.shards.read().get(metric_name) {
            return Arc::clone(shard);
        }
        let mut shards = self.shards.write();
        Arc::clone(
            shards
                .entry(metric_name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(HashMap::new()))),
        )
    }

    /// Looks up (and evicts if stale), then updates, the cached sample for
    /// one series. Returns the previous live sample, if any existed and was
    /// not stale relative to `ttl`.
    fn swap(&self, metric_name: &str, key: SeriesKey, value: f64, timestamp_unix_nanos: u64, ttl: Duration) -> Option<CachedSample> {
        let shard = self.shard(metric_name);
        let mut guard = shard.lock();
        let now = Instant::now();
        let previous = guard.get(&key).copied().filter(|sample| now.saturating_duration_since(sample.last_seen) <= ttl);
        guard.insert(
            key,
            CachedSample {
                value,
                timestamp_unix_nanos,
                last_seen: now,
            },
        );
        previous
    }

    /// Drops every series entry across every metric shard that hasn't been
    /// touched within `ttl`. Intended to be called periodically (not on the
    /// per-batch hot path) so the cache doesn't grow unbounded with series
    /// that have stopped reporting.
    pub fn evict_stale(&self, ttl: Duration) {
        let now = Instant::now();
        for shard in self.shards.read().values() {
            shard.lock().retain(|_, sample| now.saturating_duration_since(sample.last_seen) <= ttl);
        }
    }
}

fn series_key(point: &MetricDataPoint) -> SeriesKey {
    point
        .attributes
        .iter()
        .map(|(k, v)| (k.clone(), format!("{v:?}")))
        .collect()
}

/// Metric-derivation processor (`nrtransform`).
pub struct TransformProcessor {
    rules: Vec<TransformRule>,
    cache: SeriesCache,
    cache_ttl: Duration,
}

impl TransformProcessor {
    /// Builds a processor from its configured rules. `scrape_interval`
    /// determines the rate/delta cache TTL (twice the interval).
    #[must_use]
    pub fn new(rules: Vec<TransformRule>, scrape_interval: Duration) -> Self {
        Self {
            rules,
            cache: SeriesCache::new(),
            cache_ttl: cache_ttl_for_scrape_interval(scrape_interval),
        }
    }

    /// Periodic maintenance; see `SeriesCache::evict_stale`.
    pub fn evict_stale_cache_entries(&self) {
        self.cache.evict_stale(self.cache_ttl);
    }

    /// Applies every configured rule to `batch`, in declaration order. Each
    /// rule reads the metrics currently present (including ones produced by
    /// earlier rules in the same pass, since rules commonly chain, e.g.
    /// `rate` over an `aggregate` output) and appends or replaces as
    /// configured.
    pub fn process(&self, batch: &mut TelemetryBatch) {
        if batch.kind != Some(nrdot_types::descriptor::PipelineKind::Metrics) {
            return;
        }

        for rule in &self.rules {
            self.apply_rule(batch, rule);
        }
    }

    fn apply_rule(&self, batch: &mut TelemetryBatch, rule: &TransformRule) {
        match &rule.op {
            TransformOp::Aggregate { input_metric, group_by, function } => {
                self.apply_aggregate(batch, input_metric, group_by, *function, &rule.output_metric, rule.replace_input);
            }
            TransformOp::Rate { input_metric } => {
                self.apply_rate_or_delta(batch, input_metric, &rule.output_metric, rule.replace_input, true);
            }
            TransformOp::Delta { input_metric } => {
                self.apply_rate_or_delta(batch, input_metric, &rule.output_metric, rule.replace_input, false);
            }
            TransformOp::UnitConversion { input_metric, factor, to_unit } => {
                self.apply_unit_conversion(batch, input_metric, *factor, to_unit, &rule.output_metric, rule.replace_input);
            }
            TransformOp::Rename { input_metric } => {
                self.apply_rename(batch, input_metric, &rule.output_metric);
            }
            TransformOp::Filter { input_metric, include_values, key, exclude_values } => {
                self.apply_filter(batch, input_metric, key, include_values, exclude_values);
            }
            TransformOp::Combine { lhs_metric, rhs_metric, op } => {
                self.apply_combine(batch, lhs_metric, rhs_metric, *op, &rule.output_metric, rule.replace_input);
            }
            TransformOp::ExtractLabel { input_metric, source_attribute, pattern, target_label } => {
                self.apply_extract_label(batch, input_metric, source_attribute.as_deref(), pattern, target_label);
            }
        }
    }

    fn apply_aggregate(
        &self,
        batch: &mut TelemetryBatch,
        input_metric: &str,
        group_by: &[String],
        function: AggregateFunction,
        output_metric: &str,
        replace_input: bool,
    ) {
        let mut groups: HashMap<Vec<String>, (Vec<f64>, u64, String)> = HashMap::new();
        for scoped in &batch.items {
            let TelemetryItem::Metric(point) = &scoped.item else { continue };
            if point.name != input_metric {
                continue;
            }
            let group_key: Vec<String> = group_by
                .iter()
                .map(|k| point.attributes.get(k).map(|v| format!("{v:?}")).unwrap_or_default())
                .collect();
            let entry = groups.entry(group_key).or_insert_with(|| (Vec::new(), point.timestamp_unix_nanos, point.unit.clone()));
            entry.0.push(point.value);
            entry.1 = entry.1.max(point.timestamp_unix_nanos);
        }

        if replace_input {
            batch.items.retain(|scoped| !matches!(&scoped.item, TelemetryItem::Metric(p) if p.name == input_metric));
        }

        for (group_key, (values, timestamp_unix_nanos, unit)) in groups {
            let mut attributes = nrdot_types::AttributeMap::new();
            for (key, value) in group_by.iter().zip(group_key.iter()) {
                if !value.is_empty() {
                    attributes.insert(key.clone(), nrdot_types::AttributeValue::Str(value.clone()));
                }
            }
            batch.items.push(nrdot_types::batch::ResourceScoped {
                resource_attributes: nrdot_types::AttributeMap::new(),
                item: TelemetryItem::Metric(MetricDataPoint {
                    name: output_metric.to_string(),
                    unit,
                    kind: nrdot_types::batch::MetricKind::Gauge,
                    value: function.apply(&values),
                    timestamp_unix_nanos,
                    attributes,
                }),
            });
        }
    }

    fn apply_rate_or_delta(&self, batch: &mut TelemetryBatch, input_metric: &str, output_metric: &str, replace_input: bool, is_rate: bool) {
        let mut derived = Vec::new();
        for scoped in &batch.items {
            let TelemetryItem::Metric(point) = &scoped.item else { continue };
            if point.name != input_metric {
                continue;
            }
            let key = series_key(point);
            let previous = self.cache.swap(input_metric, key, point.value, point.timestamp_unix_nanos, self.cache_ttl);
            let Some(previous) = previous else { continue };

            let value_delta = point.value - previous.value;
            let derived_value = if is_rate {
                let elapsed_seconds = (point.timestamp_unix_nanos.saturating_sub(previous.timestamp_unix_nanos)) as f64 / 1_000_000_000.0;
                if elapsed_seconds <= 0.0 {
                    warn!(metric = input_metric, "non-positive elapsed time between samples, skipping rate point");
                    continue;
                }
                value_delta / elapsed_seconds
            } else {
                value_delta
            };

            derived.push(nrdot_types::batch::ResourceScoped {
                resource_attributes: scoped.resource_attributes.clone(),
                item: TelemetryItem::Metric(MetricDataPoint {
                    name: output_metric.to_string(),
                    unit: if is_rate { format!("{}/s", point.unit) } else { point.unit.clone() },
                    kind: nrdot_types::batch::MetricKind::Gauge,
                    value: derived_value,
                    timestamp_unix_nanos: point.timestamp_unix_nanos,
                    attributes: point.attributes.clone(),
                }),
            });
        }

        if replace_input {
            batch.items.retain(|scoped| !matches!(&scoped.item, TelemetryItem::Metric(p) if p.name == input_metric));
        }
        batch.items.extend(derived);
    }

    fn apply_unit_conversion(&self, batch: &mut TelemetryBatch, input_metric: &str, factor: f64, to_unit: &str, output_metric: &str, replace_input: bool) {
        let mut derived = Vec::new();
        for scoped in &batch.items {
            let TelemetryItem::Metric(point) = &scoped.item else { continue };
            if point.name != input_metric {
                continue;
            }
            let mut converted = point.clone();
            converted.name = output_metric.to_string();
            converted.unit = to_unit.to_string();
            converted.value *= factor;
            derived.push(nrdot_types::batch::ResourceScoped {
                resource_attributes: scoped.resource_attributes.clone(),
                item: TelemetryItem::Metric(converted),
            });
        }
        if replace_input {
            batch.items.retain(|scoped| !matches!(&scoped.item, TelemetryItem::Metric(p) if p.name == input_metric));
        }
        batch.items.extend(derived);
    }

    fn apply_rename(&self, batch: &mut TelemetryBatch, input_metric: &str, output_metric: &str) {
        for scoped in &mut batch.items {
            if let TelemetryItem::Metric(point) = &mut scoped.item {
                if point.name == input_metric {
                    point.name = output_metric.to_string();
                }
            }
        }
    }

    fn apply_combine(&self, batch: &mut TelemetryBatch, lhs_metric: &str, rhs_metric: &str, op: CombineOp, output_metric: &str, replace_input: bool) {
        let mut rhs_by_identity: HashMap<(SeriesKey, u64), &MetricDataPoint> = HashMap::new();
        for scoped in &batch.items {
            if let TelemetryItem::Metric(point) = &scoped.item {
                if point.name == rhs_metric {
                    rhs_by_identity.insert((series_key(point), point.timestamp_unix_nanos), point);
                }
            }
        }

        let mut derived = Vec::new();
        for scoped in &batch.items {
            let TelemetryItem::Metric(lhs) = &scoped.item else { continue };
            if lhs.name != lhs_metric {
                continue;
            }
            let Some(rhs) = rhs_by_identity.get(&(series_key(lhs), lhs.timestamp_unix_nanos)) else {
                continue;
            };
            let Some(value) = op.apply(lhs.value, rhs.value) else { continue };
            derived.push(nrdot_types::batch::ResourceScoped {
                resource_attributes: scoped.resource_attributes.clone(),
                item: TelemetryItem::Metric(MetricDataPoint {
                    name: output_metric.to_string(),
                    unit: lhs.unit.clone(),
                    kind: nrdot_types::batch::MetricKind::Gauge,
                    value,
                    timestamp_unix_nanos: lhs.timestamp_unix_nanos,
                    attributes: lhs.attributes.clone(),
                }),
            });
        }

        if replace_input {
            batch.items.retain(|scoped| {
                !matches!(&scoped.item, TelemetryItem::Metric(p) if p.name == lhs_metric || p.name == rhs_metric)
            });
        }
        batch.items.extend(derived);
    }

    fn apply_extract_label(&self, batch: &mut TelemetryBatch, input_metric: &str, source_attribute: Option<&str>, pattern: &str, target_label: &str) {
        let pattern = match Regex::new(pattern) {
            Ok(pattern) => pattern,
            Err(error) => {
                warn!(metric = input_metric, %error, "invalid extract-label pattern, skipping rule");
                return;
            }
        };
        for scoped in &mut batch.items {
            let TelemetryItem::Metric(point) = &mut scoped.item else { continue };
            if point.name != input_metric {
                continue;
            }
            let source_text: String = match source_attribute {
                Some(attribute_key) => match point.attributes.get(attribute_key).and_then(|v| v.as_str()) {
                    Some(s) => s.to_string(),
                    None => continue,
                },
                None => point.name.clone(),
            };
            let Some(captured) = pattern.captures(&source_text).and_then(|c| c.get(1)) else { continue };
            point.attributes.insert(target_label.to_string(), nrdot_types::AttributeValue::Str(captured.as_str().to_string()));
        }
    }

    fn apply_filter(&self, batch: &mut TelemetryBatch, input_metric: &str, key: &str, include_values: &[String], exclude_values: &[String]) {
        batch.items.retain(|scoped| {
            let TelemetryItem::Metric(point) = &scoped.item else { return true };
            if point.name != input_metric {
                return true;
            }
            let actual = point.attributes.get(key).and_then(|v| v.as_str());
            if !include_values.is_empty() {
                let keep = actual.is_some_and(|v| include_values.iter().any(|i| i == v));
                if !keep {
                    return false;
                }
            }
            if !exclude_values.is_empty() {
                let drop = actual.is_some_and(|v| exclude_values.iter().any(|e| e == v));
                if drop {
                    return false;
                }
            }
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use nrdot_types::batch::MetricKind;
    use nrdot_types::descriptor::PipelineKind;
    use nrdot_types::{AttributeMap, AttributeValue};

    use super::*;

    fn point(name: &str, value: f64, ts_nanos: u64, attrs: &[(&str, &str)]) -> nrdot_types::batch::ResourceScoped {
        let mut attributes = AttributeMap::new();
        for (k, v) in attrs {
            attributes.insert((*k).to_string(), AttributeValue::Str((*v).to_string()));
        }
        nrdot_types::batch::ResourceScoped {
            resource_attributes: AttributeMap::new(),
            item: TelemetryItem::Metric(MetricDataPoint {
                name: name.to_string(),
                unit: "1".to_string(),
                kind: MetricKind::Sum,
                value,
                timestamp_unix_nanos: ts_nanos,
                attributes,
            }),
        }
    }

    fn metrics_batch(items: Vec<nrdot_types::batch::ResourceScoped>) -> TelemetryBatch {
        TelemetryBatch {
            kind: Some(PipelineKind::Metrics),
            items,
        }
    }

    #[test]
    fn rate_requires_two_samples_and_divides_by_elapsed_seconds() {
        let processor = TransformProcessor::new(
            vec![TransformRule {
                op: TransformOp::Rate { input_metric: "requests.total".to_string() },
                output_metric: "requests.rate".to_string(),
                replace_input: false,
            }],
            Duration::from_secs(15),
        );

        let mut first = metrics_batch(vec![point("requests.total", 100.0, 1_000_000_000, &[("host", "a")])]);
        processor.process(&mut first);
        assert!(!first.items.iter().any(|s| matches!(&s.item, TelemetryItem::Metric(p) if p.name == "requests.rate")));

        let mut second = metrics_batch(vec![point("requests.total", 300.0, 3_000_000_000, &[("host", "a")])]);
        processor.process(&mut second);
        let rate_point = second
            .items
            .iter()
            .find_map(|s| match &s.item {
                TelemetryItem::Metric(p) if p.name == "requests.rate" => Some(p),
                _ => None,
            })
            .expect("rate point should be produced on the second sample");
        assert!((rate_point.value - 100.0).abs() < 1e-9);
    }

    #[test]
    fn aggregate_groups_by_attribute_and_reduces() {
        let processor = TransformProcessor::new(
            vec![TransformRule {
                op: TransformOp::Aggregate {
                    input_metric: "cpu.usage".to_string(),
                    group_by: vec!["host".to_string()],
                    function: AggregateFunction::Sum,
                },
                output_metric: "cpu.usage.by_host".to_string(),
                replace_input: false,
            }],
            Duration::from_secs(15),
        );
        let mut batch = metrics_batch(vec![
            point("cpu.usage", 1.0, 1, &[("host", "a"), ("core", "0")]),
            point("cpu.usage", 2.0, 1, &[("host", "a"), ("core", "1")]),
            point("cpu.usage", 5.0, 1, &[("host", "b"), ("core", "0")]),
        ]);
        processor.process(&mut batch);

        let mut aggregated: Vec<f64> = batch
            .items
            .iter()
            .filter_map(|s| match &s.item {
                TelemetryItem::Metric(p) if p.name == "cpu.usage.by_host" => Some(p.value),
                _ => None,
            })
            .collect();
        aggregated.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(aggregated, vec![3.0, 5.0]);
    }

    #[test]
    fn non_metrics_batch_is_untouched() {
        let processor = TransformProcessor::new(
            vec![TransformRule {
                op: TransformOp::Rename { input_metric: "x".to_string() },
                output_metric: "y".to_string(),
                replace_input: false,
            }],
            Duration::from_secs(15),
        );
        let mut batch = TelemetryBatch {
            kind: Some(PipelineKind::Logs),
            items: vec![],
        };
        processor.process(&mut batch);
        assert!(batch.items.is_empty());
    }

    #[test]
    fn cache_ttl_is_twice_the_scrape_interval() {
        assert_eq!(cache_ttl_for_scrape_interval(Duration::from_secs(10)), Duration::from_secs(20));
    }

    #[test]
    fn combine_divides_matching_series_by_identity_and_timestamp() {
        let processor = TransformProcessor::new(
            vec![TransformRule {
                op: TransformOp::Combine {
                    lhs_metric: "http.errors".to_string(),
                    rhs_metric: "http.requests".to_string(),
                    op: CombineOp::Divide,
                },
                output_metric: "http.error_rate".to_string(),
                replace_input: false,
            }],
            Duration::from_secs(15),
        );
        let mut batch = metrics_batch(vec![
            point("http.errors", 5.0, 100, &[("route", "/a")]),
            point("http.requests", 50.0, 100, &[("route", "/a")]),
            point("http.errors", 9.0, 100, &[("route", "/b")]),
        ]);
        processor.process(&mut batch);

        let rate = batch
            .items
            .iter()
            .find_map(|s| match &s.item {
                TelemetryItem::Metric(p) if p.name == "http.error_rate" => Some(p.value),
                _ => None,
            })
            .expect("combined point for the matched series");
        assert!((rate - 0.1).abs() < 1e-9);
        assert!(
            !batch.items.iter().any(|s| matches!(&s.item, TelemetryItem::Metric(p) if p.name == "http.error_rate" && p.value != 0.1)),
            "unmatched `/b` series must not produce a combined point"
        );
    }

    #[test]
    fn combine_skips_division_by_zero() {
        let processor = TransformProcessor::new(
            vec![TransformRule {
                op: TransformOp::Combine {
                    lhs_metric: "errors".to_string(),
                    rhs_metric: "total".to_string(),
                    op: CombineOp::Divide,
                },
                output_metric: "error_rate".to_string(),
                replace_input: false,
            }],
            Duration::from_secs(15),
        );
        let mut batch = metrics_batch(vec![point("errors", 5.0, 100, &[]), point("total", 0.0, 100, &[])]);
        processor.process(&mut batch);
        assert!(!batch.items.iter().any(|s| matches!(&s.item, TelemetryItem::Metric(p) if p.name == "error_rate")));
    }

    #[test]
    fn extract_label_promotes_a_capture_group_from_an_attribute() {
        let processor = TransformProcessor::new(
            vec![TransformRule {
                op: TransformOp::ExtractLabel {
                    input_metric: "http.requests".to_string(),
                    source_attribute: Some("http.target".to_string()),
                    pattern: r"^/api/v(\d+)/".to_string(),
                    target_label: "api_version".to_string(),
                },
                output_metric: String::new(),
                replace_input: false,
            }],
            Duration::from_secs(15),
        );
        let mut batch = metrics_batch(vec![point("http.requests", 1.0, 1, &[("http.target", "/api/v2/users")])]);
        processor.process(&mut batch);
        let TelemetryItem::Metric(point) = &batch.items[0].item else { panic!("expected metric") };
        assert_eq!(point.attributes.get("api_version"), Some(&AttributeValue::Str("2".to_string())));
    }
}
