// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! In-process telemetry batch model: the unit the four pipeline processors
//! (`nrdot-pipeline`) mutate in place as it flows through the declared
//! processor chain.

use serde::{Deserialize, Serialize};

use crate::attribute::AttributeMap;
use crate::descriptor::PipelineKind;

/// Kind of metric data point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Gauge,
    Sum,
    Histogram,
    ExponentialHistogram,
    Summary,
}

/// A single metric data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDataPoint {
    /// Metric name.
    pub name: String,
    /// Unit string (e.g. `"By"`, `"ms"`), used by the unit-conversion
    /// transform.
    pub unit: String,
    /// Kind of data point.
    pub kind: MetricKind,
    /// Scalar value. Histograms/summaries store their primary aggregate
    /// here (e.g. sum) and keep bucket detail in `attributes` — full
    /// histogram bucket modeling is out of scope for the in-process batch
    /// representation used by the cap/transform processors.
    pub value: f64,
    /// Unix-epoch nanoseconds timestamp.
    pub timestamp_unix_nanos: u64,
    /// Data-point attributes (the dimension tuple cardinality is computed
    /// over).
    pub attributes: AttributeMap,
}

/// A trace span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Span name.
    pub name: String,
    /// Trace id (hex string).
    pub trace_id: String,
    /// Span id (hex string).
    pub span_id: String,
    /// Span attributes.
    pub attributes: AttributeMap,
    /// Span event attribute maps (each event has its own attribute set).
    pub event_attributes: Vec<AttributeMap>,
}

/// A log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// The log body, when it is a plain string (redaction only descends
    /// into string bodies; structured bodies are left
    /// alone here).
    pub body: Option<String>,
    /// Severity text, e.g. `"ERROR"`.
    pub severity: Option<String>,
    /// Log record attributes.
    pub attributes: AttributeMap,
}

/// The payload carried by one `TelemetryItem`, tagged by kind so a
/// processor's `process(Batch)` can match on it without a capability
/// interface per signal type (the "dynamic pipeline composition"
/// design note).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryItem {
    /// A metric data point.
    Metric(MetricDataPoint),
    /// A trace span.
    Span(Span),
    /// A log record.
    Log(LogRecord),
}

impl TelemetryItem {
    /// Borrows the item's own attribute map (not the enclosing resource's).
    #[must_use]
    pub fn attributes(&self) -> &AttributeMap {
        match self {
            Self::Metric(m) => &m.attributes,
            Self::Span(s) => &s.attributes,
            Self::Log(l) => &l.attributes,
        }
    }

    /// Mutably borrows the item's own attribute map.
    pub fn attributes_mut(&mut self) -> &mut AttributeMap {
        match self {
            Self::Metric(m) => &mut m.attributes,
            Self::Span(s) => &mut s.attributes,
            Self::Log(l) => &mut l.attributes,
        }
    }

    /// `true` if this item is a metric data point (used by metric-only
    /// stages: nrtransform, nrcap).
    #[must_use]
    pub fn is_metric(&self) -> bool {
        matches!(self, Self::Metric(_))
    }
}

/// One item plus the attributes of the resource it's scoped under (and, for
/// spans, the instrumentation scope — folded into `resource_attributes`
/// here since no processor in this spec distinguishes the two).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceScoped {
    /// The enclosing resource's attributes (host, service, cloud, etc.).
    /// Enrichment prefers writing here; redaction/transform/cap operate on
    /// `item` but enrichment rules may read both.
    pub resource_attributes: AttributeMap,
    /// The telemetry item itself.
    pub item: TelemetryItem,
}

/// An ordered collection of resource-scoped telemetry items flowing through
/// one pipeline. Mutated in place by each processor in turn; processors
/// that drop an item remove it from `items` and increment their own drop
/// counter (never forward a partially-transformed item
/// invariant).
#[derive(Debug, Clone, Default)]
pub struct TelemetryBatch {
    /// Which pipeline this batch belongs to (metrics/traces/logs);
    /// determines which processors apply (e.g. nrtransform/nrcap are
    /// metrics-only).
    pub kind: Option<PipelineKind>,
    /// The items in this batch.
    pub items: Vec<ResourceScoped>,
}

impl TelemetryBatch {
    /// Constructs an empty batch of the given kind.
    #[must_use]
    pub fn new(kind: PipelineKind) -> Self {
        Self {
            kind: Some(kind),
            items: Vec::new(),
        }
    }

    /// Number of items currently in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `true` if the batch has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeValue;

    #[test]
    fn metric_items_are_identified_as_such() {
        let item = TelemetryItem::Metric(MetricDataPoint {
            name: "x".into(),
            unit: "1".into(),
            kind: MetricKind::Gauge,
            value: 1.0,
            timestamp_unix_nanos: 0,
            attributes: AttributeMap::new(),
        });
        assert!(item.is_metric());
        let mut log = TelemetryItem::Log(LogRecord {
            body: Some("hi".into()),
            severity: None,
            attributes: AttributeMap::new(),
        });
        assert!(!log.is_metric());
        log.attributes_mut()
            .insert("k".into(), AttributeValue::Str("v".into()));
        assert_eq!(log.attributes().len(), 1);
    }
}
