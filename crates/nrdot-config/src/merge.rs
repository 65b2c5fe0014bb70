// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Merges validated user configuration and rendered service fragments into
//! a `PipelineDescriptor`.
//!
//! Scalars are last-writer-wins (user configuration always overrides a
//! service template's defaults); the `nrenrich` static-attribute map is
//! deep-merged with first-service-wins semantics so two services of the
//! same type contributing the same attribute key don't clobber each other
//! unpredictably.

use std::collections::{BTreeMap, BTreeSet};

use nrdot_types::descriptor::{contractual_processor_order, Generation, PipelineDescriptor, PipelineKind, PipelineSpec};
use serde_json::{json, Value};

use crate::render::RenderedService;
use crate::schema::{default_endpoint_for_region, UserConfig};

/// Builds the descriptor's `receivers` map, deduplicating receiver names
/// when more than one discovered service maps to the same template (e.g.
/// two distinct MySQL instances).
fn insert_service_receivers(
    receivers: &mut BTreeMap<String, Value>,
    services: &[RenderedService],
) -> Vec<String> {
    let mut names = Vec::with_capacity(services.len());
    for (i, service) in services.iter().enumerate() {
        let key = if receivers.contains_key(&service.receiver_name) {
            format!("{}/{i}", service.receiver_name)
        } else {
            service.receiver_name.clone()
        };
        receivers.insert(key.clone(), service.receiver_config.clone());
        names.push(key);
    }
    names
}

/// Merges validated configuration and rendered services into a new
/// descriptor at `generation`.
#[must_use]
pub fn merge(config: &UserConfig, services: &[RenderedService], generation: Generation) -> PipelineDescriptor {
    let mut receivers = BTreeMap::new();
    receivers.insert("otlp".to_string(), json!({ "protocols": { "grpc": {}, "http": {} } }));
    let service_receiver_names = insert_service_receivers(&mut receivers, services);

    let sample_rate = config.traces.sample_rate;
    let has_filter = false;

    let mut pipelines = BTreeMap::new();
    let mut needed_processors = BTreeSet::new();

    if config.metrics.enabled {
        let order = contractual_processor_order(PipelineKind::Metrics, 1.0, has_filter);
        needed_processors.extend(order.iter().cloned());
        let metrics_receivers = if service_receiver_names.is_empty() {
            vec!["otlp".to_string()]
        } else {
            service_receiver_names.clone()
        };
        pipelines.insert(
            PipelineKind::Metrics,
            PipelineSpec {
                receivers: metrics_receivers,
                processors: order,
                exporters: vec!["otlp".to_string()],
            },
        );
    }

    for kind in [PipelineKind::Traces, PipelineKind::Logs] {
        let order = contractual_processor_order(kind, sample_rate, has_filter);
        needed_processors.extend(order.iter().cloned());
        pipelines.insert(
            kind,
            PipelineSpec {
                receivers: vec!["otlp".to_string()],
                processors: order,
                exporters: vec!["otlp".to_string()],
            },
        );
    }

    let mut processors = BTreeMap::new();
    if needed_processors.contains("memory_limiter") {
        processors.insert(
            "memory_limiter".to_string(),
            json!({ "check_interval": "1s", "limit_percentage": 80, "spike_limit_percentage": 20 }),
        );
    }
    if needed_processors.contains("batch") {
        processors.insert("batch".to_string(), json!({}));
    }
    if needed_processors.contains("probabilistic_sampler") {
        processors.insert(
            "probabilistic_sampler".to_string(),
            json!({ "sampling_percentage": sample_rate * 100.0 }),
        );
    }
    if needed_processors.contains("nrsecurity") {
        processors.insert(
            "nrsecurity".to_string(),
            json!({ "redact_secrets": config.security.redact_secrets }),
        );
    }
    if needed_processors.contains("nrenrich") {
        let mut static_attributes = serde_json::Map::new();
        for service in services {
            for (key, value) in &service.static_attributes {
                static_attributes.entry(key.clone()).or_insert_with(|| json!(value));
            }
        }
        processors.insert(
            "nrenrich".to_string(),
            json!({ "static_attributes": Value::Object(static_attributes) }),
        );
    }
    if needed_processors.contains("nrtransform") {
        processors.insert("nrtransform".to_string(), json!({}));
    }
    if needed_processors.contains("nrcap") {
        processors.insert(
            "nrcap".to_string(),
            json!({ "cardinality_limit": config.processing.cardinality_limit }),
        );
    }
    if needed_processors.contains("resource") {
        processors.insert("resource".to_string(), json!({}));
    }

    let mut exporters = BTreeMap::new();
    let endpoint = config
        .export
        .endpoint
        .clone()
        .unwrap_or_else(|| default_endpoint_for_region(config.export.region).to_string());
    exporters.insert(
        "otlp".to_string(),
        json!({
            "endpoint": endpoint,
            "retry_on_failure": { "max_attempts": config.export.retry.max_attempts },
        }),
    );

    PipelineDescriptor::new(receivers, processors, exporters, pipelines, generation)
}

#[cfg(test)]
mod tests {
    use nrdot_types::ServiceType;

    use super::*;
    use crate::schema::{ExportSection, LoggingSection, MetricsSection, ProcessingSection, SecuritySection, ServiceSection, TracesSection};

    fn base_config() -> UserConfig {
        UserConfig {
            service: ServiceSection { name: "host".to_string() },
            metrics: MetricsSection::default(),
            traces: TracesSection::default(),
            security: SecuritySection::default(),
            processing: ProcessingSection::default(),
            export: ExportSection::default(),
            logging: LoggingSection::default(),
        }
    }

    #[test]
    fn merge_with_no_services_still_produces_all_three_pipelines() {
        let descriptor = merge(&base_config(), &[], Generation::default().next());
        assert_eq!(descriptor.pipelines.len(), 3);
        assert!(descriptor.receivers.contains_key("otlp"));
        assert!(descriptor.processors.contains_key("memory_limiter"));
        assert!(descriptor.processors.contains_key("nrtransform"));
    }

    #[test]
    fn disabling_metrics_drops_the_metrics_pipeline_but_keeps_others() {
        let mut config = base_config();
        config.metrics.enabled = false;
        let descriptor = merge(&config, &[], Generation::default().next());
        assert_eq!(descriptor.pipelines.len(), 2);
        assert!(!descriptor.pipelines.contains_key(&PipelineKind::Metrics));
    }

    #[test]
    fn duplicate_service_receivers_get_disambiguated_names() {
        let services = vec![
            RenderedService {
                service_type: ServiceType::Mysql,
                receiver_name: "mysqlreceiver".to_string(),
                receiver_config: json!({ "endpoint": "127.0.0.1:3306" }),
                static_attributes: vec![("db.system".to_string(), "mysql".to_string())],
            },
            RenderedService {
                service_type: ServiceType::Mysql,
                receiver_name: "mysqlreceiver".to_string(),
                receiver_config: json!({ "endpoint": "127.0.0.1:3307" }),
                static_attributes: vec![("db.system".to_string(), "mysql".to_string())],
            },
        ];
        let descriptor = merge(&base_config(), &services, Generation::default().next());
        assert!(descriptor.receivers.contains_key("mysqlreceiver"));
        assert!(descriptor.receivers.contains_key("mysqlreceiver/1"));
    }

    #[test]
    fn static_attributes_are_first_service_wins() {
        let services = vec![
            RenderedService {
                service_type: ServiceType::Mysql,
                receiver_name: "mysqlreceiver".to_string(),
                receiver_config: json!({}),
                static_attributes: vec![("db.system".to_string(), "mysql".to_string())],
            },
            RenderedService {
                service_type: ServiceType::Postgresql,
                receiver_name: "postgresqlreceiver".to_string(),
                receiver_config: json!({}),
                static_attributes: vec![("db.system".to_string(), "postgresql".to_string())],
            },
        ];
        let descriptor = merge(&base_config(), &services, Generation::default().next());
        assert_eq!(descriptor.processors["nrenrich"]["static_attributes"]["db.system"], "mysql");
    }
}
