// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Port scanner: parses the kernel's TCP socket tables
//! (`/proc/net/tcp`, `/proc/net/tcp6`) and matches listening ports against
//! the well-known-port catalog.

use std::collections::BTreeSet;
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;

use nrdot_types::{Endpoint, ServiceFact, SignalTag};

use crate::catalog;
use crate::error::ScannerError;

/// Socket state value meaning "listening" in `/proc/net/tcp{,6}`'s `st`
/// column.
const TCP_LISTEN_STATE: &str = "0A";

/// Decodes a kernel-formatted IPv4 local-address field, e.g. `0100007F`.
/// The kernel stores the address as a native-endian `u32`, which on every
/// target this collector runs on (x86_64, aarch64, both little-endian)
/// means the printed hex octets are in reverse network-byte-order —
/// `0100007F` is `127.0.0.1`, not `1.0.0.127`.
fn decode_ipv4(hex: &str) -> Option<Ipv4Addr> {
    if hex.len() != 8 {
        return None;
    }
    let raw = u32::from_str_radix(hex, 16).ok()?;
    Some(Ipv4Addr::from(raw.to_le_bytes()))
}

/// Decodes a kernel-formatted IPv6 local-address field (32 hex chars). The
/// address is stored as four little-endian 32-bit words; each 8-hex-digit
/// group is byte-swapped independently, then the four groups are
/// concatenated in order.
fn decode_ipv6(hex: &str) -> Option<Ipv6Addr> {
    if hex.len() != 32 {
        return None;
    }
    let mut bytes = [0u8; 16];
    for word in 0..4 {
        let group = &hex[word * 8..word * 8 + 8];
        let raw = u32::from_str_radix(group, 16).ok()?;
        let le = raw.to_le_bytes();
        bytes[word * 4..word * 4 + 4].copy_from_slice(&le);
    }
    Some(Ipv6Addr::from(bytes))
}

fn parse_table(contents: &str, is_v6: bool) -> Vec<Endpoint> {
    let mut endpoints = Vec::new();
    for line in contents.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        let local = fields[1];
        let state = fields[3];
        if !state.eq_ignore_ascii_case(TCP_LISTEN_STATE) {
            continue;
        }
        let Some((addr_hex, port_hex)) = local.split_once(':') else {
            continue;
        };
        let Ok(port) = u16::from_str_radix(port_hex, 16) else {
            continue;
        };
        let address = if is_v6 {
            decode_ipv6(addr_hex).map(|a| a.to_string())
        } else {
            decode_ipv4(addr_hex).map(|a| a.to_string())
        };
        if let Some(address) = address {
            endpoints.push(Endpoint {
                address,
                port,
                protocol: "tcp".to_string(),
            });
        }
    }
    endpoints
}

/// Reads `/proc/net/tcp` and `/proc/net/tcp6` under `proc_root`, returning a
/// `ServiceFact` for every listening endpoint whose port is well-known.
pub fn scan(proc_root: &Path) -> Result<Vec<ServiceFact>, ScannerError> {
    let mut endpoints = Vec::new();
    for (file, is_v6) in [("net/tcp", false), ("net/tcp6", true)] {
        let path = proc_root.join(file);
        match fs::read_to_string(&path) {
            Ok(contents) => endpoints.extend(parse_table(&contents, is_v6)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ScannerError {
                    scanner: "port",
                    message: format!("reading {}: {e}", path.display()),
                });
            }
        }
    }

    let mut facts = Vec::new();
    for endpoint in endpoints {
        let Some(service_type) = catalog::match_port(endpoint.port) else {
            continue;
        };
        let signals = BTreeSet::from([SignalTag::Port]);
        if let Ok(fact) = ServiceFact::new(service_type, BTreeSet::from([endpoint]), signals) {
            facts.push(fact);
        }
    }
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn decodes_ipv4_loopback_byte_order() {
        assert_eq!(decode_ipv4("0100007F"), Some(Ipv4Addr::new(127, 0, 0, 1)));
    }

    #[test]
    fn parses_listening_entries_only() {
        let table = "  sl  local_address rem_address   st\n\
             0: 0100007F:0CEA 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 12345 1 0000000000000000 100 0 0 10 0\n\
             1: 00000000:1F90 00000000:0000 06 00000000:00000000 00:00000000 00000000     0        0 12346 1 0000000000000000 100 0 0 10 0\n";
        let endpoints = parse_table(table, false);
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].port, 0x0CEA);
    }

    #[test]
    fn scan_matches_well_known_port_3306() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("net")).unwrap();
        let table = "  sl  local_address rem_address   st\n\
             0: 0100007F:0CEA 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 12345 1 0000000000000000 100 0 0 10 0\n";
        fs::write(tmp.path().join("net/tcp"), table).unwrap();
        let facts = scan(tmp.path()).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].service_type, nrdot_types::ServiceType::Mysql);
    }
}
