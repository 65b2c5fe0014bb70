// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Static catalogs the scanners correlate against: process-name patterns,
//! well-known ports, canonical config-file paths, and package-name
//! substrings. Kept as plain data (no reflection) per the
//! "Reflective YAML schema" design note, which applies equally here:
//! discovery pattern matching should be table-driven, not type-driven.

use nrdot_types::ServiceType;

/// Maps a process executable name to the service type it indicates, plus
/// the default endpoint port that service's receiver template expects.
pub const PROCESS_PATTERNS: &[(&[&str], ServiceType, u16)] = &[
    (&["mysqld", "mariadbd"], ServiceType::Mysql, 3306),
    (&["postgres", "postmaster"], ServiceType::Postgresql, 5432),
    (&["redis-server"], ServiceType::Redis, 6379),
    (&["nginx"], ServiceType::Nginx, 80),
    (&["httpd", "apache2"], ServiceType::Apache, 80),
    (&["mongod"], ServiceType::Mongodb, 27017),
    (&["elasticsearch"], ServiceType::Elasticsearch, 9200),
    (&["rabbitmq-server", "beam.smp"], ServiceType::Rabbitmq, 5672),
    (&["kafka", "kafka-server-start"], ServiceType::Kafka, 9092),
    (&["zookeeper"], ServiceType::Zookeeper, 2181),
    (&["cassandra"], ServiceType::Cassandra, 9042),
    (&["memcached"], ServiceType::Memcached, 11211),
];

/// Resolves a process executable name to a service type + default port, if
/// it matches one of the known patterns.
#[must_use]
pub fn match_process_name(executable: &str) -> Option<(ServiceType, u16)> {
    PROCESS_PATTERNS
        .iter()
        .find(|(names, _, _)| names.contains(&executable))
        .map(|(_, kind, port)| (*kind, *port))
}

/// Well-known TCP ports -> service type.
pub const WELL_KNOWN_PORTS: &[(u16, ServiceType)] = &[
    (3306, ServiceType::Mysql),
    (5432, ServiceType::Postgresql),
    (6379, ServiceType::Redis),
    (80, ServiceType::Http),
    (443, ServiceType::Https),
    (27017, ServiceType::Mongodb),
    (9200, ServiceType::Elasticsearch),
    (5672, ServiceType::Rabbitmq),
    (9092, ServiceType::Kafka),
    (2181, ServiceType::Zookeeper),
    (9042, ServiceType::Cassandra),
    (11211, ServiceType::Memcached),
];

/// Resolves a listening port to a service type, if well-known.
#[must_use]
pub fn match_port(port: u16) -> Option<ServiceType> {
    WELL_KNOWN_PORTS
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, kind)| *kind)
}

/// Canonical configuration-file/directory paths -> service type.
pub const CONFIG_PATHS: &[(&str, ServiceType)] = &[
    ("/etc/mysql", ServiceType::Mysql),
    ("/etc/postgresql", ServiceType::Postgresql),
    ("/etc/redis", ServiceType::Redis),
    ("/etc/nginx", ServiceType::Nginx),
    ("/etc/apache2", ServiceType::Apache),
    ("/etc/httpd", ServiceType::Apache),
    ("/etc/mongod.conf", ServiceType::Mongodb),
    ("/etc/elasticsearch", ServiceType::Elasticsearch),
    ("/etc/rabbitmq", ServiceType::Rabbitmq),
    ("/etc/kafka", ServiceType::Kafka),
];

/// Package-name substrings -> service type, for matching package-manager
/// listings.
pub const PACKAGE_PATTERNS: &[(&str, ServiceType)] = &[
    ("mysql-server", ServiceType::Mysql),
    ("mariadb-server", ServiceType::Mysql),
    ("postgresql", ServiceType::Postgresql),
    ("redis-server", ServiceType::Redis),
    ("redis", ServiceType::Redis),
    ("nginx", ServiceType::Nginx),
    ("apache2", ServiceType::Apache),
    ("httpd", ServiceType::Apache),
    ("mongodb", ServiceType::Mongodb),
    ("elasticsearch", ServiceType::Elasticsearch),
    ("rabbitmq-server", ServiceType::Rabbitmq),
    ("kafka", ServiceType::Kafka),
];

/// Resolves a package name to a service type by substring match. Checks
/// longer/more specific patterns first (callers pass already-ordered
/// `PACKAGE_PATTERNS`) so e.g. `"mysql-server"` wins over a hypothetical
/// bare `"mysql"` pattern.
#[must_use]
pub fn match_package_name(name: &str) -> Option<ServiceType> {
    let lower = name.to_ascii_lowercase();
    PACKAGE_PATTERNS
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, kind)| *kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_mysql_process_aliases() {
        assert_eq!(match_process_name("mysqld"), Some((ServiceType::Mysql, 3306)));
        assert_eq!(match_process_name("mariadbd"), Some((ServiceType::Mysql, 3306)));
        assert_eq!(match_process_name("unrelated"), None);
    }

    #[test]
    fn matches_well_known_ports() {
        assert_eq!(match_port(6379), Some(ServiceType::Redis));
        assert_eq!(match_port(65000), None);
    }

    #[test]
    fn matches_package_names_case_insensitively() {
        assert_eq!(match_package_name("MySQL-Server"), Some(ServiceType::Mysql));
    }
}
