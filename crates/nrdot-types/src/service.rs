// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! `ServiceFact`: a discovered service, correlated from one or more scanner
//! signals (process, port, config file, package manager).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::TypesError;
use crate::process::ProcessFact;

/// The catalog of service kinds discovery knows how to recognize.
///
/// Kept as a closed enum (rather than a free-form string) so template
/// lookup in `nrdot-config` is exhaustive and typo-proof; an unrecognized
/// signal is simply not emitted as a `ServiceFact` rather than producing an
/// `Other(String)` catch-all, since untemplated services can't be rendered
/// anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Mysql,
    Postgresql,
    Redis,
    Nginx,
    Apache,
    Mongodb,
    Elasticsearch,
    Rabbitmq,
    Kafka,
    Zookeeper,
    Cassandra,
    Memcached,
    Http,
    Https,
}

impl ServiceType {
    /// Stable string key used in template lookup and descriptor rendering.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Postgresql => "postgresql",
            Self::Redis => "redis",
            Self::Nginx => "nginx",
            Self::Apache => "apache",
            Self::Mongodb => "mongodb",
            Self::Elasticsearch => "elasticsearch",
            Self::Rabbitmq => "rabbitmq",
            Self::Kafka => "kafka",
            Self::Zookeeper => "zookeeper",
            Self::Cassandra => "cassandra",
            Self::Memcached => "memcached",
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

/// Which scanner(s) corroborated a `ServiceFact`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalTag {
    Process,
    Port,
    ConfigFile,
    Package,
}

/// Coarse quality score derived from the number of corroborating signal
/// tags: `HIGH` for >= 3, `MEDIUM` for 2, `LOW` for 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    /// Computes the tier from a signal-tag count: HIGH for >= 3 distinct
    /// signals, MEDIUM for 2, LOW for 1.
    #[must_use]
    pub const fn from_signal_count(count: usize) -> Self {
        match count {
            0 => Self::Low, // unreachable in practice; see `ServiceFact::new`
            1 => Self::Low,
            2 => Self::Medium,
            _ => Self::High,
        }
    }
}

/// A network endpoint a service is believed to listen on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// IP address or hostname.
    pub address: String,
    /// TCP/UDP port.
    pub port: u16,
    /// Transport protocol, e.g. `"tcp"`.
    pub protocol: String,
}

/// A package-manager record corroborating a service (name + optional
/// version), as emitted by the package scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// The installed package name as reported by the package manager.
    pub name: String,
    /// Package version, if parseable from the package manager's output.
    pub version: Option<String>,
}

/// A discovered service, deduplicated by `(type, endpoint-set)` and
/// enriched with every corroborating signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceFact {
    /// The kind of service.
    pub service_type: ServiceType,
    /// Service version, if determined (typically from the package scanner
    /// or a version-bearing config file).
    pub version: Option<String>,
    /// Endpoints this service is believed to listen on.
    pub endpoints: BTreeSet<Endpoint>,
    /// Which scanners corroborated this fact.
    pub signals: BTreeSet<SignalTag>,
    /// Confidence tier, recomputed from `signals.len()` on every merge.
    pub confidence: ConfidenceTier,
    /// The originating process fact, if the process scanner contributed.
    pub process: Option<ProcessFact>,
    /// Config file paths that exist and corroborate this service.
    pub config_paths: Vec<String>,
    /// Package-manager record, if the package scanner contributed.
    pub package: Option<PackageRecord>,
}

impl ServiceFact {
    /// Constructs a `ServiceFact` from its first signal. Fails if `signals`
    /// is empty: a `ServiceFact` with fewer than one signal cannot exist
    /// (non-empty by construction).
    pub fn new(
        service_type: ServiceType,
        endpoints: BTreeSet<Endpoint>,
        signals: BTreeSet<SignalTag>,
    ) -> Result<Self, TypesError> {
        if signals.is_empty() {
            return Err(TypesError::EmptySignalSet);
        }
        let confidence = ConfidenceTier::from_signal_count(signals.len());
        Ok(Self {
            service_type,
            version: None,
            endpoints,
            signals,
            confidence,
            process: None,
            config_paths: Vec::new(),
            package: None,
        })
    }

    /// The correlation key used to deduplicate facts across scanners:
    /// `(type, endpoint-set)`.
    #[must_use]
    pub fn correlation_key(&self) -> (ServiceType, BTreeSet<Endpoint>) {
        (self.service_type, self.endpoints.clone())
    }

    /// Merges another fact describing the same service into this one:
    /// signal tags, process reference, config paths, and package record are
    /// unioned; version is filled in if previously unset; confidence is
    /// recomputed from the merged signal count.
    pub fn merge(&mut self, other: ServiceFact) {
        self.signals.extend(other.signals);
        self.endpoints.extend(other.endpoints);
        self.config_paths.extend(other.config_paths);
        if self.process.is_none() {
            self.process = other.process;
        }
        if self.package.is_none() {
            self.package = other.package;
        }
        if self.version.is_none() {
            self.version = other.version;
        }
        self.confidence = ConfidenceTier::from_signal_count(self.signals.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(port: u16) -> Endpoint {
        Endpoint {
            address: "127.0.0.1".into(),
            port,
            protocol: "tcp".into(),
        }
    }

    #[test]
    fn empty_signal_set_is_rejected() {
        let result = ServiceFact::new(ServiceType::Mysql, BTreeSet::new(), BTreeSet::new());
        assert!(matches!(result, Err(TypesError::EmptySignalSet)));
    }

    #[test]
    fn confidence_tier_escalates_with_merges() {
        let mut a = ServiceFact::new(
            ServiceType::Mysql,
            BTreeSet::from([ep(3306)]),
            BTreeSet::from([SignalTag::Port]),
        )
        .unwrap();
        assert_eq!(a.confidence, ConfidenceTier::Low);

        let b = ServiceFact::new(
            ServiceType::Mysql,
            BTreeSet::from([ep(3306)]),
            BTreeSet::from([SignalTag::Process]),
        )
        .unwrap();
        a.merge(b);
        assert_eq!(a.confidence, ConfidenceTier::Medium);

        let c = ServiceFact::new(
            ServiceType::Mysql,
            BTreeSet::from([ep(3306)]),
            BTreeSet::from([SignalTag::ConfigFile]),
        )
        .unwrap();
        a.merge(c);
        assert_eq!(a.confidence, ConfidenceTier::High);
    }
}
