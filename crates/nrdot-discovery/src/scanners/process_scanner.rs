// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Process scanner: matches `ProcessFact`s against the static service
//! catalog.

use std::collections::BTreeSet;

use nrdot_types::{Endpoint, ProcessFact, ServiceFact, SignalTag};

use crate::catalog;

/// Matches a list of process facts against `catalog::PROCESS_PATTERNS`,
/// emitting one `ServiceFact` per match with the originating process
/// attached and the catalog's default endpoint.
#[must_use]
pub fn scan(processes: &[ProcessFact]) -> Vec<ServiceFact> {
    let mut facts = Vec::new();
    for process in processes {
        let Some((service_type, default_port)) = catalog::match_process_name(&process.executable)
        else {
            continue;
        };
        let endpoints = BTreeSet::from([Endpoint {
            address: "127.0.0.1".to_string(),
            port: default_port,
            protocol: "tcp".to_string(),
        }]);
        let signals = BTreeSet::from([SignalTag::Process]);
        if let Ok(mut fact) = ServiceFact::new(service_type, endpoints, signals) {
            fact.process = Some(process.clone());
            facts.push(fact);
        }
    }
    facts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(executable: &str) -> ProcessFact {
        ProcessFact {
            pid: 1,
            ppid: 0,
            executable: executable.to_string(),
            command_line: executable.to_string(),
            uid: 0,
            start_time_ticks: 0,
            rss_bytes: 0,
            vsize_bytes: 0,
            thread_count: 1,
            open_file_count: None,
            cpu_time_secs: 0.0,
            cpu_percent: 0.0,
        }
    }

    #[test]
    fn matches_known_process_names() {
        let facts = scan(&[process("mysqld"), process("bash")]);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].service_type, nrdot_types::ServiceType::Mysql);
        assert!(facts[0].process.is_some());
    }
}
