// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! `GET /v1/discovery` and `POST /v1/discovery/preview`.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use nrdot_config::{placeholder, render};
use nrdot_discovery::DiscoveryResult;
use nrdot_types::{ConfidenceTier, ServiceFact, ServiceType};

use crate::error::ApiError;
use crate::state::AppState;

/// Routes for inspecting discovery output.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/discovery", get(show_discovery))
        .route("/v1/discovery/preview", post(preview_discovery))
}

#[derive(Serialize)]
struct ServiceFactView {
    service_type: &'static str,
    version: Option<String>,
    endpoints: Vec<String>,
    signals: Vec<&'static str>,
    confidence: &'static str,
}

impl From<&ServiceFact> for ServiceFactView {
    fn from(fact: &ServiceFact) -> Self {
        Self {
            service_type: fact.service_type.as_str(),
            version: fact.version.clone(),
            endpoints: fact.endpoints.iter().map(|e| format!("{}:{}", e.address, e.port)).collect(),
            signals: fact.signals.iter().map(signal_str).collect(),
            confidence: confidence_str(fact.confidence),
        }
    }
}

fn signal_str(signal: &nrdot_types::SignalTag) -> &'static str {
    match signal {
        nrdot_types::SignalTag::Process => "process",
        nrdot_types::SignalTag::Port => "port",
        nrdot_types::SignalTag::ConfigFile => "config_file",
        nrdot_types::SignalTag::Package => "package",
    }
}

fn confidence_str(tier: ConfidenceTier) -> &'static str {
    match tier {
        ConfidenceTier::Low => "low",
        ConfidenceTier::Medium => "medium",
        ConfidenceTier::High => "high",
    }
}

#[derive(Serialize)]
struct DiscoveryResponse {
    services: Vec<ServiceFactView>,
    errors: Vec<String>,
}

impl From<&DiscoveryResult> for DiscoveryResponse {
    fn from(result: &DiscoveryResult) -> Self {
        Self {
            services: result.services.iter().map(ServiceFactView::from).collect(),
            errors: result.errors.iter().map(std::string::ToString::to_string).collect(),
        }
    }
}

async fn current_discovery(state: &AppState) -> DiscoveryResult {
    if let Some(cached) = state.discovery_cache().get() {
        return cached;
    }
    let result = nrdot_discovery::discover(state.discovery_config(), None).await;
    state.discovery_cache().put(result.clone());
    result
}

async fn show_discovery(State(state): State<AppState>) -> Json<DiscoveryResponse> {
    let result = current_discovery(&state).await;
    Json((&result).into())
}

#[derive(Debug, Deserialize)]
struct PreviewRequest {
    /// Service-type names (e.g. `"mysql"`, `"redis"`) to render a preview
    /// for. An empty list previews every currently discovered service.
    #[serde(default)]
    services: Vec<String>,
}

#[derive(Serialize)]
struct PreviewedReceiver {
    service_type: &'static str,
    receiver_name: String,
    receiver_config: serde_json::Value,
}

#[derive(Serialize)]
struct PreviewResponse {
    receivers: Vec<PreviewedReceiver>,
    required_variables: Vec<String>,
    skipped_low_confidence: usize,
}

async fn preview_discovery(State(state): State<AppState>, Json(request): Json<PreviewRequest>) -> Result<Json<PreviewResponse>, ApiError> {
    let result = current_discovery(&state).await;

    let wanted: Option<std::collections::BTreeSet<&str>> =
        if request.services.is_empty() { None } else { Some(request.services.iter().map(std::string::String::as_str).collect()) };

    let selected: Vec<ServiceFact> = result
        .services
        .into_iter()
        .filter(|fact| wanted.as_ref().map_or(true, |w| w.contains(fact.service_type.as_str())))
        .collect();

    let skipped_low_confidence = selected.iter().filter(|f| f.confidence == ConfidenceTier::Low).count();

    let rendered = render::render_discovered(&selected)?;

    let mut receivers = Vec::with_capacity(rendered.len());
    let mut seen_names: BTreeMap<String, usize> = BTreeMap::new();
    let mut required = std::collections::BTreeSet::new();

    for service in rendered {
        let count = seen_names.entry(service.receiver_name.clone()).or_insert(0);
        let name = if *count == 0 { service.receiver_name.clone() } else { format!("{}/{count}", service.receiver_name) };
        *count += 1;

        required.extend(placeholder::required_variables(&service.receiver_config));

        receivers.push(PreviewedReceiver {
            service_type: service_type_str(service.service_type),
            receiver_name: name,
            receiver_config: service.receiver_config,
        });
    }

    Ok(Json(PreviewResponse {
        receivers,
        required_variables: required.into_iter().collect(),
        skipped_low_confidence,
    }))
}

fn service_type_str(service_type: ServiceType) -> &'static str {
    service_type.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_str_round_trips_every_tier() {
        assert_eq!(confidence_str(ConfidenceTier::Low), "low");
        assert_eq!(confidence_str(ConfidenceTier::Medium), "medium");
        assert_eq!(confidence_str(ConfidenceTier::High), "high");
    }
}
