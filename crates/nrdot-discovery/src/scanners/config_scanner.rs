// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Config-file scanner: existence checks against the canonical
//! configuration path catalog.

use std::collections::BTreeSet;
use std::path::Path;

use nrdot_types::{ServiceFact, SignalTag};

use crate::catalog;

/// Checks each canonical path in `catalog::CONFIG_PATHS` for existence
/// under `root` (normally `/`, parameterized for tests), emitting one
/// `ServiceFact` per hit.
#[must_use]
pub fn scan(root: &Path) -> Vec<ServiceFact> {
    let mut facts = Vec::new();
    for (path, service_type) in catalog::CONFIG_PATHS {
        let full = root.join(path.trim_start_matches('/'));
        if !full.exists() {
            continue;
        }
        let signals = BTreeSet::from([SignalTag::ConfigFile]);
        if let Ok(mut fact) = ServiceFact::new(*service_type, BTreeSet::new(), signals) {
            fact.config_paths.push((*path).to_string());
            facts.push(fact);
        }
    }
    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn detects_existing_config_directories() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("etc/nginx")).unwrap();
        let facts = scan(tmp.path());
        assert!(facts.iter().any(|f| f.service_type == nrdot_types::ServiceType::Nginx));
        assert!(!facts.iter().any(|f| f.service_type == nrdot_types::ServiceType::Mysql));
    }
}
