// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Shared data model for NRDOT-HOST.
//!
//! Every entity crossing a component boundary — a discovered service, a
//! rendered pipeline descriptor, a telemetry batch flowing through the
//! processor chain — is defined once here so that `nrdot-process`,
//! `nrdot-discovery`, `nrdot-config`, `nrdot-supervisor`, and
//! `nrdot-pipeline` share a single vocabulary instead of re-deriving it at
//! each boundary.

pub mod attribute;
pub mod batch;
pub mod cardinality;
pub mod collector;
pub mod descriptor;
pub mod error;
pub mod process;
pub mod service;
pub mod supervisor;

pub use attribute::{AttributeMap, AttributeValue};
pub use batch::{LogRecord, MetricDataPoint, MetricKind, ResourceScoped, Span, TelemetryBatch, TelemetryItem};
pub use cardinality::CardinalityKey;
pub use collector::{CollectorInstance, ExitCause, HealthState};
pub use descriptor::{Fingerprint, Generation, PipelineDescriptor, PipelineKind, ProcessorName};
pub use error::TypesError;
pub use process::ProcessFact;
pub use service::{ConfidenceTier, Endpoint, PackageRecord, ServiceFact, ServiceType, SignalTag};
pub use supervisor::{RestartBudget, SupervisorState};
