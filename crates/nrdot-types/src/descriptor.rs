// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! `PipelineDescriptor`: the fully-rendered, signed pipeline configuration
//! consumed by the embedded collector.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Monotonically increasing generation tag. `Generation(0)` is never
/// emitted by the config engine — the first rendered descriptor is
/// generation 1 — so `Generation::default()` can serve as an
/// "unset"/"no descriptor yet" sentinel in supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Generation {
    /// Returns the next generation in sequence.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Deterministic content hash of a rendered descriptor (BLAKE3 of the
/// canonical serialization — sorted map keys, see
/// `PipelineDescriptor::fingerprint`). Stable under input-key reordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex_encode(&self.0))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

/// One of the three telemetry pipelines a descriptor declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Metrics,
    Traces,
    Logs,
}

impl PipelineKind {
    /// All three kinds, in the fixed order they're declared in a descriptor.
    pub const ALL: [PipelineKind; 3] = [Self::Metrics, Self::Traces, Self::Logs];
}

/// Name of a processor as it appears in a pipeline's ordered processor
/// list, e.g. `"batch"` or `"nrsecurity"`.
pub type ProcessorName = String;

/// The contractual processor order for every pipeline:
///
/// ```text
/// memory_limiter -> batch -> [probabilistic_sampler, traces only, sample_rate<1]
///   -> [filter, if include/exclude configured] -> nrsecurity -> nrenrich
///   -> nrtransform (metrics only) -> nrcap (metrics only) -> resource
/// ```
///
/// This function is the single source of truth for that order; the config
/// engine's merge step calls it rather than hand-assembling the list so the
/// order can never drift between the two.
#[must_use]
pub fn contractual_processor_order(
    kind: PipelineKind,
    sample_rate: f64,
    has_filter: bool,
) -> Vec<ProcessorName> {
    let mut order = vec!["memory_limiter".to_string(), "batch".to_string()];
    if kind == PipelineKind::Traces && sample_rate < 1.0 {
        order.push("probabilistic_sampler".to_string());
    }
    if has_filter {
        order.push("filter".to_string());
    }
    order.push("nrsecurity".to_string());
    order.push("nrenrich".to_string());
    if kind == PipelineKind::Metrics {
        order.push("nrtransform".to_string());
        order.push("nrcap".to_string());
    }
    order.push("resource".to_string());
    order
}

/// A single declared pipeline: its ordered processor chain plus the
/// receiver/exporter names it's wired to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Receiver names feeding this pipeline.
    pub receivers: Vec<String>,
    /// Processor names, in contractual order.
    pub processors: Vec<ProcessorName>,
    /// Exporter names this pipeline forwards to.
    pub exporters: Vec<String>,
}

/// A fully-rendered pipeline configuration: receivers, processors,
/// exporters, and the three pipelines, plus its fingerprint and
/// generation. Immutable once emitted — mutating a field after
/// construction does not update the fingerprint, so callers must always
/// go through `PipelineDescriptor::new`/`finalize` rather than constructing
/// fields directly and reusing a stale fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDescriptor {
    /// Named receiver configurations (service-type -> receiver config,
    /// opaque JSON so the config engine doesn't need a typed schema per
    /// receiver kind).
    pub receivers: BTreeMap<String, serde_json::Value>,
    /// Named processor configurations.
    pub processors: BTreeMap<String, serde_json::Value>,
    /// Named exporter configurations.
    pub exporters: BTreeMap<String, serde_json::Value>,
    /// The three pipelines.
    pub pipelines: BTreeMap<PipelineKind, PipelineSpec>,
    /// Content hash of the canonical serialization below.
    pub fingerprint: Fingerprint,
    /// Monotonically increasing generation number.
    pub generation: Generation,
}

impl PipelineDescriptor {
    /// Builds the descriptor's canonical serialization (sorted map keys —
    /// guaranteed here by using `BTreeMap` throughout rather than
    /// `HashMap`) and hashes it with BLAKE3. The fingerprint is computed
    /// over everything except the fingerprint field itself and the
    /// generation number, so two descriptors with identical content but
    /// different generations still share a fingerprint — which is what lets
    /// the supervisor recognize "no-op" reloads.
    #[must_use]
    pub fn compute_fingerprint(
        receivers: &BTreeMap<String, serde_json::Value>,
        processors: &BTreeMap<String, serde_json::Value>,
        exporters: &BTreeMap<String, serde_json::Value>,
        pipelines: &BTreeMap<PipelineKind, PipelineSpec>,
    ) -> Fingerprint {
        #[derive(Serialize)]
        struct Canonical<'a> {
            receivers: &'a BTreeMap<String, serde_json::Value>,
            processors: &'a BTreeMap<String, serde_json::Value>,
            exporters: &'a BTreeMap<String, serde_json::Value>,
            pipelines: &'a BTreeMap<PipelineKind, PipelineSpec>,
        }
        let canonical = Canonical {
            receivers,
            processors,
            exporters,
            pipelines,
        };
        // serde_json's map serialization for BTreeMap is already key-sorted;
        // we serialize to a canonical JSON string rather than relying on
        // struct field order so reordering input maps never changes the hash.
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        Fingerprint(*blake3::hash(&bytes).as_bytes())
    }

    /// Constructs a new descriptor, computing its fingerprint from content
    /// and assigning `generation`.
    #[must_use]
    pub fn new(
        receivers: BTreeMap<String, serde_json::Value>,
        processors: BTreeMap<String, serde_json::Value>,
        exporters: BTreeMap<String, serde_json::Value>,
        pipelines: BTreeMap<PipelineKind, PipelineSpec>,
        generation: Generation,
    ) -> Self {
        let fingerprint = Self::compute_fingerprint(&receivers, &processors, &exporters, &pipelines);
        Self {
            receivers,
            processors,
            exporters,
            pipelines,
            fingerprint,
            generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contractual_order_metrics_with_filter() {
        let order = contractual_processor_order(PipelineKind::Metrics, 1.0, true);
        assert_eq!(
            order,
            vec![
                "memory_limiter",
                "batch",
                "filter",
                "nrsecurity",
                "nrenrich",
                "nrtransform",
                "nrcap",
                "resource",
            ]
        );
    }

    #[test]
    fn contractual_order_traces_sampled_no_filter() {
        let order = contractual_processor_order(PipelineKind::Traces, 0.1, false);
        assert_eq!(
            order,
            vec![
                "memory_limiter",
                "batch",
                "probabilistic_sampler",
                "nrsecurity",
                "nrenrich",
                "resource",
            ]
        );
    }

    #[test]
    fn fingerprint_stable_under_map_reordering() {
        let mut r1 = BTreeMap::new();
        r1.insert("a".to_string(), serde_json::json!(1));
        r1.insert("b".to_string(), serde_json::json!(2));
        let mut r2 = BTreeMap::new();
        r2.insert("b".to_string(), serde_json::json!(2));
        r2.insert("a".to_string(), serde_json::json!(1));

        let empty_proc = BTreeMap::new();
        let empty_exp = BTreeMap::new();
        let empty_pipe = BTreeMap::new();

        let fp1 = PipelineDescriptor::compute_fingerprint(&r1, &empty_proc, &empty_exp, &empty_pipe);
        let fp2 = PipelineDescriptor::compute_fingerprint(&r2, &empty_proc, &empty_exp, &empty_pipe);
        assert_eq!(fp1, fp2);
    }

    #[test]
    fn generation_is_never_part_of_fingerprint() {
        let r = BTreeMap::new();
        let p = BTreeMap::new();
        let e = BTreeMap::new();
        let pipe = BTreeMap::new();
        let d1 = PipelineDescriptor::new(r.clone(), p.clone(), e.clone(), pipe.clone(), Generation(1));
        let d2 = PipelineDescriptor::new(r, p, e, pipe, Generation(2));
        assert_eq!(d1.fingerprint, d2.fingerprint);
        assert_ne!(d1.generation, d2.generation);
    }
}
