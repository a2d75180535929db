//! Error types for the offline worker

use crate::network::NetworkError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum WorkerError {
    Store(partition_cache::StoreError),
    Network(NetworkError),
    Asset(String),
    Install(String),
    Config(String),
    Io(Box<std::io::Error>),
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::Store(err) => write!(f, "Cache storage error: {}", err),
            WorkerError::Network(err) => write!(f, "Network error: {}", err),
            WorkerError::Asset(msg) => write!(f, "Asset unavailable: {}", msg),
            WorkerError::Install(msg) => write!(f, "Install failed: {}", msg),
            WorkerError::Config(msg) => write!(f, "Configuration error: {}", msg),
            WorkerError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkerError::Store(err) => Some(err),
            WorkerError::Network(err) => Some(err),
            WorkerError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<partition_cache::StoreError> for WorkerError {
    fn from(err: partition_cache::StoreError) -> Self {
        WorkerError::Store(err)
    }
}

impl From<NetworkError> for WorkerError {
    fn from(err: NetworkError) -> Self {
        WorkerError::Network(err)
    }
}

impl From<std::io::Error> for WorkerError {
    fn from(err: std::io::Error) -> Self {
        WorkerError::Io(Box::new(err))
    }
}

impl From<url::ParseError> for WorkerError {
    fn from(err: url::ParseError) -> Self {
        WorkerError::Config(format!("invalid URL: {}", err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for WorkerError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        WorkerError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;

impl IntoResponse for WorkerError {
    fn into_response(self) -> Response {
        let status = match &self {
            WorkerError::Network(e) => {
                tracing::warn!(error = %e, "Upstream fetch failed");
                StatusCode::BAD_GATEWAY
            }
            WorkerError::Asset(_) => StatusCode::BAD_GATEWAY,
            other => {
                tracing::error!(error = %other, "Worker error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, axum::Json(json!({ "error": self.to_string() }))).into_response()
    }
}
