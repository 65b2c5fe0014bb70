// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! The four custom telemetry pipeline processors: `nrsecurity` (data
//! redaction), `nrenrich` (metadata enrichment), `nrtransform` (metric
//! derivation), and `nrcap` (cardinality cap).
//!
//! Each processor operates on an in-process `TelemetryBatch` and is
//! independently constructible and testable; `registry` composes them
//! behind a name-keyed lookup that mirrors a rendered descriptor's
//! declared processor order, so the embedded collector's own built-in
//! stages (`memory_limiter`, `batch`, `probabilistic_sampler`, `filter`,
//! `resource`) are simply absent from this crate and skipped over when a
//! pipeline is run — they are an external collaborator's responsibility,
//! not something reimplemented here.

pub mod cap;
pub mod enrichment;
pub mod error;
pub mod redaction;
pub mod registry;
pub mod transform;

pub use cap::{CapConfig, CapProcessor, CapStrategy};
pub use enrichment::{EnrichmentConfig, EnrichmentProcessor, EnrichmentSnapshot};
pub use error::PipelineError;
pub use redaction::{RedactionConfig, RedactionProcessor};
pub use registry::{NamedProcessor, Registry, RegistryMetrics, OWNED_PROCESSOR_NAMES};
pub use transform::{AggregateFunction, TransformOp, TransformProcessor, TransformRule};
