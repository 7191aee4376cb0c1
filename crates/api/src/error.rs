//! API and startup errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use obd_protocol::ParseQueryIdError;
use obd_sampler::{MonitorError, SamplerError};
use obd_session::{CatalogError, SessionError};
use serde_json::json;
use std::io;
use storage::StorageError;
use thiserror::Error;

/// Configuration and startup errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Invalid query identifier: {0}")]
    QueryId(#[from] ParseQueryIdError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Errors returned by HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Adapter unavailable: {0}")]
    Adapter(#[from] SessionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Adapter(_) => StatusCode::BAD_GATEWAY,
            ApiError::Storage(StorageError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                StatusCode::NOT_FOUND
            }
            ApiError::Storage(
                StorageError::UnsupportedFormat(_) | StorageError::InvalidHeader { .. },
            ) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<MonitorError> for ApiError {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::AlreadyRunning => ApiError::Conflict(err.to_string()),
            MonitorError::Sampler(SamplerError::InvalidInterval) => {
                ApiError::BadRequest(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
