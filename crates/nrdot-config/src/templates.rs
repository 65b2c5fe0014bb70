// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! The embedded per-service-type template library: a receiver config and a
//! default set of `nrenrich` static attributes for each recognized
//! `ServiceType`.
//!
//! Templates are plain data, not code — adding a new recognized service
//! means adding one `ServiceTemplate` entry, not touching the render or
//! merge logic.

use nrdot_types::ServiceType;
use serde_json::json;

/// A receiver + attribute fragment for one service type.
#[derive(Debug, Clone)]
pub struct ServiceTemplate {
    /// Receiver name, as it will appear in the descriptor's `receivers` map
    /// (and in the owning pipeline's receiver list).
    pub receiver_name: &'static str,
    /// Builds the receiver config for this service given its discovered
    /// endpoint, if any.
    pub receiver_config: fn(endpoint: Option<&str>) -> serde_json::Value,
    /// Static resource attributes this service type always contributes.
    pub static_attributes: &'static [(&'static str, &'static str)],
}

/// Looks up the template for a service type. Every `ServiceType` variant
/// has an entry — discovery's catalog and this template library are kept
/// in lockstep by the exhaustive match below, so a missing arm is a
/// compile error rather than a silent `UnknownTemplate` at runtime.
#[must_use]
pub fn lookup(service_type: ServiceType) -> ServiceTemplate {
    match service_type {
        ServiceType::Mysql => ServiceTemplate {
            receiver_name: "mysqlreceiver",
            receiver_config: |endpoint| json!({ "endpoint": endpoint.unwrap_or("localhost:3306") }),
            static_attributes: &[("db.system", "mysql")],
        },
        ServiceType::Postgresql => ServiceTemplate {
            receiver_name: "postgresqlreceiver",
            receiver_config: |endpoint| json!({ "endpoint": endpoint.unwrap_or("localhost:5432") }),
            static_attributes: &[("db.system", "postgresql")],
        },
        ServiceType::Redis => ServiceTemplate {
            receiver_name: "redisreceiver",
            receiver_config: |endpoint| json!({ "endpoint": endpoint.unwrap_or("localhost:6379") }),
            static_attributes: &[("db.system", "redis")],
        },
        ServiceType::Nginx => ServiceTemplate {
            receiver_name: "nginxreceiver",
            receiver_config: |endpoint| json!({ "endpoint": endpoint.unwrap_or("http://localhost:80/status") }),
            static_attributes: &[("webserver", "nginx")],
        },
        ServiceType::Apache => ServiceTemplate {
            receiver_name: "apachereceiver",
            receiver_config: |endpoint| json!({ "endpoint": endpoint.unwrap_or("http://localhost:80/server-status") }),
            static_attributes: &[("webserver", "apache")],
        },
        ServiceType::Mongodb => ServiceTemplate {
            receiver_name: "mongodbreceiver",
            receiver_config: |endpoint| json!({ "endpoint": endpoint.unwrap_or("localhost:27017") }),
            static_attributes: &[("db.system", "mongodb")],
        },
        ServiceType::Elasticsearch => ServiceTemplate {
            receiver_name: "elasticsearchreceiver",
            receiver_config: |endpoint| json!({ "endpoint": endpoint.unwrap_or("http://localhost:9200") }),
            static_attributes: &[("db.system", "elasticsearch")],
        },
        ServiceType::Rabbitmq => ServiceTemplate {
            receiver_name: "rabbitmqreceiver",
            receiver_config: |endpoint| json!({ "endpoint": endpoint.unwrap_or("http://localhost:15672") }),
            static_attributes: &[("messaging.system", "rabbitmq")],
        },
        ServiceType::Kafka => ServiceTemplate {
            receiver_name: "kafkametricsreceiver",
            receiver_config: |endpoint| json!({ "brokers": [endpoint.unwrap_or("localhost:9092")] }),
            static_attributes: &[("messaging.system", "kafka")],
        },
        ServiceType::Zookeeper => ServiceTemplate {
            receiver_name: "zookeeperreceiver",
            receiver_config: |endpoint| json!({ "endpoint": endpoint.unwrap_or("localhost:2181") }),
            static_attributes: &[("coordination.system", "zookeeper")],
        },
        ServiceType::Cassandra => ServiceTemplate {
            receiver_name: "jmxreceiver",
            receiver_config: |endpoint| json!({ "endpoint": endpoint.unwrap_or("localhost:7199"), "target_system": "cassandra" }),
            static_attributes: &[("db.system", "cassandra")],
        },
        ServiceType::Memcached => ServiceTemplate {
            receiver_name: "memcachedreceiver",
            receiver_config: |endpoint| json!({ "endpoint": endpoint.unwrap_or("localhost:11211") }),
            static_attributes: &[("db.system", "memcached")],
        },
        ServiceType::Http => ServiceTemplate {
            receiver_name: "httpcheckreceiver",
            receiver_config: |endpoint| json!({ "targets": [{ "endpoint": endpoint.unwrap_or("http://localhost:80") }] }),
            static_attributes: &[("net.protocol.name", "http")],
        },
        ServiceType::Https => ServiceTemplate {
            receiver_name: "httpcheckreceiver",
            receiver_config: |endpoint| json!({ "targets": [{ "endpoint": endpoint.unwrap_or("https://localhost:443") }] }),
            static_attributes: &[("net.protocol.name", "https")],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_service_type_has_a_template() {
        for service_type in [
            ServiceType::Mysql,
            ServiceType::Postgresql,
            ServiceType::Redis,
            ServiceType::Nginx,
            ServiceType::Apache,
            ServiceType::Mongodb,
            ServiceType::Elasticsearch,
            ServiceType::Rabbitmq,
            ServiceType::Kafka,
            ServiceType::Zookeeper,
            ServiceType::Cassandra,
            ServiceType::Memcached,
            ServiceType::Http,
            ServiceType::Https,
        ] {
            let template = lookup(service_type);
            assert!(!template.receiver_name.is_empty());
            assert!(!template.static_attributes.is_empty());
        }
    }

    #[test]
    fn falls_back_to_default_endpoint_when_none_discovered() {
        let template = lookup(ServiceType::Mysql);
        let config = (template.receiver_config)(None);
        assert_eq!(config["endpoint"], "localhost:3306");
    }

    #[test]
    fn uses_discovered_endpoint_when_present() {
        let template = lookup(ServiceType::Redis);
        let config = (template.receiver_config)(Some("10.0.0.5:6379"));
        assert_eq!(config["endpoint"], "10.0.0.5:6379");
    }
}
