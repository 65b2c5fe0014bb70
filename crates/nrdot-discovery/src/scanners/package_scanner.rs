// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Package scanner: invokes the host package manager (first available of
//! `dpkg`, `rpm`) to enumerate installed packages and match them against
//! the package-name catalog.

use std::collections::BTreeSet;
use std::process::Command;

use nrdot_types::{PackageRecord, ServiceFact, SignalTag};

use crate::catalog;
use crate::error::ScannerError;

/// One parsed package-manager listing line.
struct InstalledPackage {
    name: String,
    version: Option<String>,
}

fn run(cmd: &str, args: &[&str]) -> Option<String> {
    Command::new(cmd)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).into_owned())
}

/// Parses `dpkg -l` output. Lines of interest start with `ii` (installed)
/// followed by whitespace-separated name/version/arch/description columns.
fn parse_dpkg(output: &str) -> Vec<InstalledPackage> {
    output
        .lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let status = cols.next()?;
            if status != "ii" {
                return None;
            }
            let name = cols.next()?.to_string();
            let version = cols.next().map(|s| s.to_string());
            Some(InstalledPackage { name, version })
        })
        .collect()
}

/// Parses `rpm -qa --qf '%{NAME} %{VERSION}\n'` output: one `name version`
/// pair per line.
fn parse_rpm(output: &str) -> Vec<InstalledPackage> {
    output
        .lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let name = cols.next()?.to_string();
            let version = cols.next().map(|s| s.to_string());
            Some(InstalledPackage { name, version })
        })
        .collect()
}

fn list_installed_packages() -> Result<Vec<InstalledPackage>, ScannerError> {
    if let Some(output) = run("dpkg", &["-l"]) {
        return Ok(parse_dpkg(&output));
    }
    if let Some(output) = run("rpm", &["-qa", "--qf", "%{NAME} %{VERSION}\\n"]) {
        return Ok(parse_rpm(&output));
    }
    Err(ScannerError {
        scanner: "package",
        message: "neither dpkg nor rpm is available on this host".to_string(),
    })
}

/// Enumerates installed packages via the host package manager and matches
/// them against `catalog::PACKAGE_PATTERNS`.
pub fn scan() -> Result<Vec<ServiceFact>, ScannerError> {
    let packages = list_installed_packages()?;
    let mut facts = Vec::new();
    for package in packages {
        let Some(service_type) = catalog::match_package_name(&package.name) else {
            continue;
        };
        let signals = BTreeSet::from([SignalTag::Package]);
        if let Ok(mut fact) = ServiceFact::new(service_type, BTreeSet::new(), signals) {
            fact.package = Some(PackageRecord {
                name: package.name,
                version: package.version,
            });
            facts.push(fact);
        }
    }
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dpkg_listing() {
        let output = "Desired=Unknown/Install/Remove/Purge/Hold\n\
             ii  mysql-server   8.0.34-0ubuntu0  amd64  MySQL database server\n\
             rc  some-old-pkg   1.0              amd64  removed config only\n";
        let packages = parse_dpkg(output);
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "mysql-server");
        assert_eq!(packages[0].version.as_deref(), Some("8.0.34-0ubuntu0"));
    }

    #[test]
    fn parses_rpm_listing() {
        let output = "nginx 1.20.1\nredis 6.2.6\n";
        let packages = parse_rpm(output);
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[1].name, "redis");
    }
}
