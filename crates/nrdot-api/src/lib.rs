// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Loopback-only HTTP control API.
//!
//! Exposes `GET /v1/status`, `GET /v1/health`, `GET`/`POST /v1/config`,
//! `POST /v1/reload`, `GET /v1/metrics`, and `GET /v1/discovery` plus
//! `POST /v1/discovery/preview`. Every request is rejected with `403`
//! unless it originates from a loopback peer; mutating endpoints are
//! additionally rejected with `403` when the server was started read-only.

pub mod error;
pub mod middleware;
mod routes;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use state::AppState;

/// Errors that can occur starting or running the control API server.
#[derive(Error, Debug)]
pub enum ApiServerError {
    /// The configured bind address could not be parsed.
    #[error("invalid control API bind address '{addr}': {details}")]
    InvalidBindAddress { addr: String, details: String },
    /// Binding the listening socket failed.
    #[error("failed to bind control API on '{addr}': {details}")]
    BindFailed { addr: String, details: String },
    /// The HTTP server exited with an I/O error while serving.
    #[error("control API server error on '{addr}': {details}")]
    ServerError { addr: String, details: String },
}

fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::status::routes())
        .merge(routes::config::routes())
        .merge(routes::reload::routes())
        .merge(routes::metrics::routes())
        .merge(routes::discovery::routes())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(axum::middleware::from_fn(middleware::loopback_only)))
        .with_state(state)
}

/// Binds and serves the control API on `bind_addr` until `shutdown`
/// resolves. `bind_addr` is expected to be a loopback address
/// (`127.0.0.1:<port>` or `[::1]:<port>`) — the `loopback_only` middleware
/// enforces this at the request level regardless of what the socket itself
/// is bound to, so a misconfigured non-loopback bind address fails closed
/// rather than open.
pub async fn run(bind_addr: &str, state: AppState, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<(), ApiServerError> {
    let addr: SocketAddr = bind_addr.parse().map_err(|e| ApiServerError::InvalidBindAddress {
        addr: bind_addr.to_string(),
        details: format!("{e}"),
    })?;

    let app = router(state);

    let listener = TcpListener::bind(addr).await.map_err(|e| ApiServerError::BindFailed {
        addr: addr.to_string(),
        details: format!("{e}"),
    })?;

    info!(%addr, "control API listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ApiServerError::ServerError {
            addr: addr.to_string(),
            details: format!("{e}"),
        })
}
