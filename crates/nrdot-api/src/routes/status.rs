// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! `GET /v1/status` and `GET /v1/health`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use nrdot_types::collector::HealthState;
use nrdot_types::supervisor::SupervisorState;

use crate::state::AppState;

/// Routes for overall status and health.
pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/status", get(show_status)).route("/v1/health", get(show_health))
}

/// Coarse-grained overall status, derived from the active and (if a
/// reload is in flight) candidate instance's health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Computes overall status from the supervisor's state: unhealthy with no
/// active instance or an unhealthy/exited one, degraded while starting or
/// mid-reload, healthy otherwise.
#[must_use]
pub fn overall_status(state: &SupervisorState) -> OverallStatus {
    let Some(active) = &state.active else {
        return OverallStatus::Unhealthy;
    };
    match active.health {
        HealthState::Unhealthy | HealthState::Exited => OverallStatus::Unhealthy,
        HealthState::Healthy if state.candidate.is_none() => OverallStatus::Healthy,
        HealthState::Healthy | HealthState::Starting | HealthState::Terminating => OverallStatus::Degraded,
    }
}

#[derive(Serialize)]
struct ComponentStatus {
    name: &'static str,
    health: &'static str,
    generation: Option<u64>,
}

fn health_str(health: HealthState) -> &'static str {
    match health {
        HealthState::Starting => "starting",
        HealthState::Healthy => "healthy",
        HealthState::Unhealthy => "unhealthy",
        HealthState::Terminating => "terminating",
        HealthState::Exited => "exited",
    }
}

fn components(state: &SupervisorState) -> Vec<ComponentStatus> {
    let mut components = Vec::new();
    if let Some(active) = &state.active {
        components.push(ComponentStatus {
            name: "active",
            health: health_str(active.health),
            generation: Some(active.generation.0),
        });
    }
    if let Some(candidate) = &state.candidate {
        components.push(ComponentStatus {
            name: "candidate",
            health: health_str(candidate.health),
            generation: Some(candidate.generation.0),
        });
    }
    components
}

#[derive(Serialize)]
struct StatusResponse {
    status: OverallStatus,
    version: String,
    uptime_seconds: u64,
    active_fingerprint: Option<String>,
    active_generation: Option<u64>,
    last_reload_unix_secs: Option<u64>,
    components: Vec<ComponentStatus>,
}

async fn show_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let supervisor = state.supervisor().lock().await;
    let sup_state = supervisor.state();
    Json(StatusResponse {
        status: overall_status(sup_state),
        version: state.version().to_string(),
        uptime_seconds: state.uptime_seconds(),
        active_fingerprint: sup_state.last_good_fingerprint.map(|f| f.to_string()),
        active_generation: sup_state.active.as_ref().map(|i| i.generation.0),
        last_reload_unix_secs: state.last_reload_unix_secs(),
        components: components(sup_state),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: OverallStatus,
    components: Vec<ComponentStatus>,
}

async fn show_health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let supervisor = state.supervisor().lock().await;
    let sup_state = supervisor.state();
    let status = overall_status(sup_state);
    let http_status = match status {
        OverallStatus::Healthy | OverallStatus::Degraded => StatusCode::OK,
        OverallStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        http_status,
        Json(HealthResponse {
            status,
            components: components(sup_state),
        }),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use nrdot_types::collector::CollectorInstance;
    use nrdot_types::descriptor::Generation;

    use super::*;

    fn state_with(active: Option<HealthState>, candidate: Option<HealthState>) -> SupervisorState {
        let mut state = SupervisorState::new(5, std::time::Duration::from_secs(60));
        state.active = active.map(|health| {
            let mut instance = CollectorInstance::spawned(Generation(1), 100, 100, Instant::now());
            instance.health = health;
            instance
        });
        state.candidate = candidate.map(|health| {
            let mut instance = CollectorInstance::spawned(Generation(2), 200, 200, Instant::now());
            instance.health = health;
            instance
        });
        state
    }

    #[test]
    fn no_active_instance_is_unhealthy() {
        assert_eq!(overall_status(&state_with(None, None)), OverallStatus::Unhealthy);
    }

    #[test]
    fn healthy_active_with_no_candidate_is_healthy() {
        assert_eq!(overall_status(&state_with(Some(HealthState::Healthy), None)), OverallStatus::Healthy);
    }

    #[test]
    fn healthy_active_with_a_candidate_mid_reload_is_degraded() {
        assert_eq!(
            overall_status(&state_with(Some(HealthState::Healthy), Some(HealthState::Starting))),
            OverallStatus::Degraded
        );
    }

    #[test]
    fn unhealthy_active_is_unhealthy_even_with_a_healthy_candidate() {
        assert_eq!(
            overall_status(&state_with(Some(HealthState::Unhealthy), Some(HealthState::Healthy))),
            OverallStatus::Unhealthy
        );
    }
}
