// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Correlates the four scanners' independent results into one `ServiceFact`
//! per `(type, endpoint-set)` key (spec.md §4.2), merging signal tags,
//! process reference, config paths, and package record.
//!
//! Facts with no endpoints (the config-file and package scanners never
//! produce one) carry no endpoint-set to key on, so they're folded into
//! whichever fact of the same type already exists rather than spawning a
//! same-type-empty-endpoint sibling; this is recorded as an explicit
//! decision in DESIGN.md. Facts that do carry endpoints are correlated
//! strictly by `(type, endpoint-set)`, so two genuinely distinct instances
//! of the same service type (e.g. MySQL on `:3306` and `:3307`) stay
//! separate instead of being folded into one inflated-confidence fact.

use std::collections::{BTreeMap, BTreeSet};

use nrdot_types::{Endpoint, ServiceFact, ServiceType};

/// Merges scanner outputs into a deduplicated, confidence-scored list.
#[must_use]
pub fn correlate(scanner_results: Vec<Vec<ServiceFact>>) -> Vec<ServiceFact> {
    let mut merged: BTreeMap<(ServiceType, BTreeSet<Endpoint>), ServiceFact> = BTreeMap::new();
    let mut endpointless: Vec<ServiceFact> = Vec::new();

    for facts in scanner_results {
        for fact in facts {
            if fact.endpoints.is_empty() {
                endpointless.push(fact);
            } else {
                merged
                    .entry(fact.correlation_key())
                    .and_modify(|existing| existing.merge(fact.clone()))
                    .or_insert(fact);
            }
        }
    }

    for fact in endpointless {
        match merged.values_mut().find(|existing| existing.service_type == fact.service_type) {
            Some(existing) => existing.merge(fact),
            None => {
                merged.insert(fact.correlation_key(), fact);
            }
        }
    }

    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nrdot_types::{ConfidenceTier, Endpoint, SignalTag};

    fn fact(signals: &[SignalTag], endpoint: Option<u16>) -> ServiceFact {
        let endpoints = endpoint
            .map(|port| {
                BTreeSet::from([Endpoint {
                    address: "127.0.0.1".into(),
                    port,
                    protocol: "tcp".into(),
                }])
            })
            .unwrap_or_default();
        ServiceFact::new(ServiceType::Mysql, endpoints, signals.iter().copied().collect()).unwrap()
    }

    #[test]
    fn correlates_across_scanners_into_high_confidence() {
        let process = fact(&[SignalTag::Process], Some(3306));
        let port = fact(&[SignalTag::Port], Some(3306));
        let config = fact(&[SignalTag::ConfigFile], None);

        let merged = correlate(vec![vec![process], vec![port], vec![config]]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].confidence, ConfidenceTier::High);
        assert_eq!(merged[0].signals.len(), 3);
    }

    #[test]
    fn distinct_service_types_stay_separate() {
        let mysql = fact(&[SignalTag::Process], Some(3306));
        let mut redis = fact(&[SignalTag::Port], Some(6379));
        redis.service_type = ServiceType::Redis;

        let merged = correlate(vec![vec![mysql, redis]]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn same_type_distinct_endpoints_stay_separate() {
        let mysql_a = fact(&[SignalTag::Process], Some(3306));
        let mysql_b = fact(&[SignalTag::Port], Some(3307));

        let merged = correlate(vec![vec![mysql_a, mysql_b]]);
        assert_eq!(merged.len(), 2, "two instances of the same service type on disjoint ports must not be folded into one");
        for m in &merged {
            assert_eq!(m.signals.len(), 1, "each instance keeps only its own signal, not the other's");
            assert_eq!(m.confidence, ConfidenceTier::Low);
        }
    }
}
