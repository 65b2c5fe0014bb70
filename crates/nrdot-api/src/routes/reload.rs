// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! `POST /v1/reload`.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use nrdot_supervisor::ReloadOutcome;
use nrdot_types::descriptor::Generation;

use crate::error::ApiError;
use crate::state::AppState;

/// Routes for triggering a blue/green reload.
pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/reload", post(trigger_reload))
}

#[derive(Debug, Default, Deserialize)]
struct ReloadRequest {
    /// Reload even if the last-rendered descriptor's fingerprint matches
    /// the currently active one.
    #[serde(default)]
    force: bool,
}

#[derive(Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum ReloadResponse {
    Promoted { generation: Generation, fingerprint: String },
    Aborted { reason: String },
    NoOpSameFingerprint,
}

impl From<ReloadOutcome> for ReloadResponse {
    fn from(outcome: ReloadOutcome) -> Self {
        match outcome {
            ReloadOutcome::Promoted { generation, fingerprint } => ReloadResponse::Promoted { generation, fingerprint: fingerprint.to_string() },
            ReloadOutcome::Aborted { reason } => ReloadResponse::Aborted { reason },
            ReloadOutcome::NoOpSameFingerprint => ReloadResponse::NoOpSameFingerprint,
        }
    }
}

async fn trigger_reload(State(state): State<AppState>, body: Option<Json<ReloadRequest>>) -> Result<Json<ReloadResponse>, ApiError> {
    if state.read_only() {
        return Err(ApiError::ReadOnly);
    }

    let request = body.map(|Json(r)| r).unwrap_or_default();

    let descriptor = state
        .last_descriptor()
        .await
        .ok_or_else(|| ApiError::BadRequest("no configuration has been rendered yet".to_string()))?;

    let mut supervisor = state.supervisor().lock().await;
    let outcome = supervisor
        .reload(&descriptor, request.force)
        .await
        .map_err(|e| ApiError::Reload(e.to_string()))?;
    drop(supervisor);

    state.mark_reloaded_now();

    Ok(Json(outcome.into()))
}
