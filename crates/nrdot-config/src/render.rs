// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Renders discovered `ServiceFact`s into pipeline fragments using the
//! template library.
//!
//! Only HIGH and MEDIUM confidence facts are rendered automatically; LOW
//! confidence facts are surfaced to the control API's discovery preview but
//! never wired into a running pipeline without explicit user confirmation.

use nrdot_types::{ConfidenceTier, ServiceFact};
use serde_json::Value;

use crate::error::ConfigError;
use crate::templates;

/// One rendered service: the receiver to register plus the static
/// attributes it contributes to `nrenrich`.
#[derive(Debug, Clone)]
pub struct RenderedService {
    /// The service this fragment was rendered from.
    pub service_type: nrdot_types::ServiceType,
    /// Receiver name in the descriptor's `receivers` map.
    pub receiver_name: String,
    /// The receiver's configuration.
    pub receiver_config: Value,
    /// Static resource attributes this service contributes.
    pub static_attributes: Vec<(String, String)>,
}

/// Renders every auto-renderable (HIGH/MEDIUM confidence) service fact.
/// Facts below that bar are dropped from the result rather than erroring —
/// low-confidence discovery is advisory only.
pub fn render_discovered(facts: &[ServiceFact]) -> Result<Vec<RenderedService>, ConfigError> {
    let mut rendered = Vec::new();
    let mut errors = Vec::new();

    for fact in facts {
        if fact.confidence == ConfidenceTier::Low {
            continue;
        }
        match render_one(fact) {
            Ok(service) => rendered.push(service),
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        Ok(rendered)
    } else {
        Err(ConfigError::Multiple(errors))
    }
}

fn render_one(fact: &ServiceFact) -> Result<RenderedService, ConfigError> {
    let template = templates::lookup(fact.service_type);
    let endpoint = fact.endpoints.iter().next().map(|ep| format!("{}:{}", ep.address, ep.port));
    let receiver_config = (template.receiver_config)(endpoint.as_deref());

    let mut static_attributes: Vec<(String, String)> = template
        .static_attributes
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    if let Some(version) = &fact.version {
        static_attributes.push(("service.version".to_string(), version.clone()));
    }

    Ok(RenderedService {
        service_type: fact.service_type,
        receiver_name: template.receiver_name.to_string(),
        receiver_config,
        static_attributes,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use nrdot_types::{Endpoint, ServiceType, SignalTag};

    use super::*;

    fn high_confidence_mysql() -> ServiceFact {
        let mut fact = ServiceFact::new(
            ServiceType::Mysql,
            BTreeSet::from([Endpoint {
                address: "127.0.0.1".to_string(),
                port: 3306,
                protocol: "tcp".to_string(),
            }]),
            BTreeSet::from([SignalTag::Port, SignalTag::Process, SignalTag::Package]),
        )
        .unwrap();
        fact.version = Some("8.0.35".to_string());
        fact
    }

    #[test]
    fn renders_high_confidence_fact() {
        let facts = vec![high_confidence_mysql()];
        let rendered = render_discovered(&facts).unwrap();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].receiver_name, "mysqlreceiver");
        assert_eq!(rendered[0].receiver_config["endpoint"], "127.0.0.1:3306");
        assert!(rendered[0]
            .static_attributes
            .contains(&("service.version".to_string(), "8.0.35".to_string())));
    }

    #[test]
    fn drops_low_confidence_facts() {
        let fact = ServiceFact::new(
            ServiceType::Redis,
            BTreeSet::from([Endpoint {
                address: "127.0.0.1".to_string(),
                port: 6379,
                protocol: "tcp".to_string(),
            }]),
            BTreeSet::from([SignalTag::Port]),
        )
        .unwrap();
        let rendered = render_discovered(&[fact]).unwrap();
        assert!(rendered.is_empty());
    }
}
