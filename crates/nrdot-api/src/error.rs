// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Error types for the control API, and their mapping onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use nrdot_config::ConfigError;

/// One offending field surfaced from a validation failure.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    /// Dotted field path, e.g. `"service.name"`.
    pub field: String,
    /// Why it failed.
    pub reason: String,
}

/// Errors the control API's handlers can return.
#[derive(Error, Debug)]
pub enum ApiError {
    /// `POST /v1/config` failed schema or parse validation.
    #[error("configuration validation failed")]
    Validation(Vec<FieldError>),
    /// A reload or restart attempt failed.
    #[error("reload failed: {0}")]
    Reload(String),
    /// A mutating endpoint was called while the server is running
    /// read-only.
    #[error("the control API is running read-only")]
    ReadOnly,
    /// The request body didn't deserialize to the expected shape.
    #[error("malformed request body: {0}")]
    BadRequest(String),
    /// Something unexpected (I/O, internal invariant) went wrong.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Multiple(errors) => ApiError::Validation(
                errors
                    .into_iter()
                    .map(|e| field_error_from(&e))
                    .collect(),
            ),
            other => ApiError::Validation(vec![field_error_from(&other)]),
        }
    }
}

fn field_error_from(err: &ConfigError) -> FieldError {
    match err {
        ConfigError::InvalidConfig { field, reason } => FieldError {
            field: field.clone(),
            reason: reason.clone(),
        },
        ConfigError::UnknownTemplate { service_type } => FieldError {
            field: "discovery".to_string(),
            reason: format!("no template registered for service type `{service_type}`"),
        },
        ConfigError::MergeConflict { path, reason } => FieldError {
            field: path.clone(),
            reason: reason.clone(),
        },
        ConfigError::ParseError(reason) => FieldError {
            field: "<document>".to_string(),
            reason: reason.clone(),
        },
        ConfigError::Multiple(_) => FieldError {
            field: "<document>".to_string(),
            reason: err.to_string(),
        },
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldError>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, fields) = match &self {
            ApiError::Validation(fields) => (StatusCode::BAD_REQUEST, fields.clone()),
            ApiError::Reload(_) => (StatusCode::BAD_GATEWAY, Vec::new()),
            ApiError::ReadOnly => (StatusCode::FORBIDDEN, Vec::new()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, Vec::new()),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()),
        };
        let body = ErrorBody {
            error: self.to_string(),
            fields,
        };
        (status, Json(body)).into_response()
    }
}
