use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failures surfaced by a guest engine or its host.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GuestError {
    #[error("session is closed")]
    Closed,
    #[error("guest engine: {0}")]
    Engine(String),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            Self::NotFound(e) => (StatusCode::NOT_FOUND, e.as_str()),
            Self::BadRequest(e) => (StatusCode::BAD_REQUEST, e.as_str()),
            Self::Conflict(e) => (StatusCode::CONFLICT, e.as_str()),
            Self::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.as_str()),
        };
        let body = serde_json::json!({ "error": msg });
        (status, axum::Json(body)).into_response()
    }
}

impl From<GuestError> for ServerError {
    fn from(e: GuestError) -> Self {
        match e {
            GuestError::Closed => Self::NotFound(e.to_string()),
            GuestError::Engine(msg) => Self::Internal(msg),
        }
    }
}
