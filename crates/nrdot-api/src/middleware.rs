// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Loopback-only enforcement: every request's resolved remote address is
//! inspected, and non-loopback peers are rejected with `403` before any
//! handler runs.

use axum::extract::{ConnectInfo, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;

/// Middleware layer rejecting any request whose peer address is not
/// loopback (`127.0.0.0/8` or `::1`).
pub async fn loopback_only(ConnectInfo(addr): ConnectInfo<SocketAddr>, request: Request, next: Next) -> Response {
    if !addr.ip().is_loopback() {
        tracing::warn!(peer = %addr, "rejected control API request from non-loopback peer");
        return (StatusCode::FORBIDDEN, "control API is loopback-only").into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    #[test]
    fn loopback_addresses_are_recognized() {
        assert!(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)).is_loopback());
        assert!(IpAddr::V6(Ipv6Addr::LOCALHOST).is_loopback());
        assert!(!IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)).is_loopback());
    }
}
