// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! `GET /v1/config` and `POST /v1/config`.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use nrdot_config::{ConfigEngine, ConfigWarning};
use nrdot_types::descriptor::{Generation, PipelineDescriptor};

use crate::error::ApiError;
use crate::state::{AppState, ConfigSource};

/// Routes for reading and applying configuration.
pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/config", get(show_config).post(apply_config))
}

#[derive(Serialize)]
struct ConfigResponse {
    generation: Option<Generation>,
    fingerprint: Option<String>,
    source: Option<&'static str>,
    last_render_unix_secs: Option<u64>,
    descriptor: Option<PipelineDescriptor>,
}

async fn show_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let descriptor = state.last_descriptor().await;
    let source = if descriptor.is_some() { Some(state.config_source().await.as_str()) } else { None };
    Json(ConfigResponse {
        generation: descriptor.as_ref().map(|d| d.generation),
        fingerprint: descriptor.as_ref().map(|d| d.fingerprint.to_string()),
        source,
        last_render_unix_secs: state.last_render_unix_secs(),
        descriptor,
    })
}

#[derive(Debug, Deserialize)]
struct ApplyConfigRequest {
    /// Raw YAML user configuration document.
    config: String,
    /// When `true`, validate and render but never apply or persist.
    #[serde(default)]
    dry_run: bool,
    /// Optional operator-supplied note, logged alongside the render.
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Serialize)]
struct ApplyConfigResponse {
    applied: bool,
    generation: Generation,
    fingerprint: String,
    warnings: Vec<ConfigWarning>,
}

async fn apply_config(State(state): State<AppState>, Json(request): Json<ApplyConfigRequest>) -> Result<Json<ApplyConfigResponse>, ApiError> {
    if state.read_only() && !request.dry_run {
        return Err(ApiError::ReadOnly);
    }

    if let Some(comment) = &request.comment {
        tracing::info!(comment, dry_run = request.dry_run, "applying configuration via control API");
    }

    let discovery = current_discovery(&state).await;

    if request.dry_run {
        // Render against a scratch engine so the reported generation and
        // fingerprint reflect what a real apply would produce, without
        // advancing the live engine's generation counter or rollback ring.
        let mut scratch = ConfigEngine::new();
        let outcome = scratch.render(&request.config, &discovery)?;
        return Ok(Json(ApplyConfigResponse {
            applied: false,
            generation: outcome.descriptor.generation,
            fingerprint: outcome.descriptor.fingerprint.to_string(),
            warnings: outcome.warnings,
        }));
    }

    let outcome = {
        let mut engine = state.config_engine().lock().await;
        engine.render(&request.config, &discovery)?
    };

    state.set_last_descriptor(outcome.descriptor.clone(), ConfigSource::Api).await;

    let mut supervisor = state.supervisor().lock().await;
    supervisor.reload(&outcome.descriptor, false).await.map_err(|e| ApiError::Reload(e.to_string()))?;
    drop(supervisor);
    state.mark_reloaded_now();

    Ok(Json(ApplyConfigResponse {
        applied: true,
        generation: outcome.descriptor.generation,
        fingerprint: outcome.descriptor.fingerprint.to_string(),
        warnings: outcome.warnings,
    }))
}

async fn current_discovery(state: &AppState) -> nrdot_discovery::DiscoveryResult {
    if let Some(cached) = state.discovery_cache().get() {
        return cached;
    }
    let result = nrdot_discovery::discover(state.discovery_config(), None).await;
    state.discovery_cache().put(result.clone());
    result
}
