// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! `CardinalityKey`: the identity of a distinct metric series, used by the
//! cardinality-cap processor.

use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeMap, AttributeValue};

/// Identity of a distinct metric series: metric name plus the sorted
/// attribute-value tuple. `AttributeMap` is a `BTreeMap`, so iterating it
/// already yields sorted `(key, value)` pairs — this type just owns a
/// flattened, hashable/comparable snapshot of that for use as a set
/// member/map key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CardinalityKey {
    /// Metric name.
    pub metric_name: String,
    /// Sorted `(attribute key, stringified value)` pairs. Values are
    /// stringified for a stable, hashable representation; the cap
    /// processor only needs identity comparison, not type-preserving
    /// round-tripping.
    pub attributes: Vec<(String, String)>,
}

impl CardinalityKey {
    /// Builds a key from a metric name and its attribute map.
    #[must_use]
    pub fn new(metric_name: &str, attributes: &AttributeMap) -> Self {
        let attributes = attributes
            .iter()
            .map(|(k, v)| (k.clone(), stringify(v)))
            .collect();
        Self {
            metric_name: metric_name.to_string(),
            attributes,
        }
    }

    /// Builds a key with a reduced set of attribute keys retained (used by
    /// the `aggregate` cap strategy to strip labels by decreasing
    /// specificity).
    #[must_use]
    pub fn with_keys_retained(&self, keep: &[&str]) -> Self {
        let attributes = self
            .attributes
            .iter()
            .filter(|(k, _)| keep.contains(&k.as_str()))
            .cloned()
            .collect();
        Self {
            metric_name: self.metric_name.clone(),
            attributes,
        }
    }
}

fn stringify(value: &AttributeValue) -> String {
    match value {
        AttributeValue::Str(s) => s.clone(),
        AttributeValue::Int(i) => i.to_string(),
        AttributeValue::Double(d) => d.to_string(),
        AttributeValue::Bool(b) => b.to_string(),
        AttributeValue::Bytes(b) => format!("{b:?}"),
        AttributeValue::List(_) | AttributeValue::Map(_) => {
            serde_json::to_string(value).unwrap_or_default()
        }
    }
}
