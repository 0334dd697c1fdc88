//! Gateway error types.
//!
//! The wallet client understands only the fixed status vocabulary
//! (400/401/403/404/500) with empty or plain-text bodies. No structured
//! error JSON on these endpoints, and no diagnostic detail — the caller is
//! an OS client, not a developer tool.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use passkit_core::{SerializeError, StoreError};

#[derive(Debug)]
pub enum GatewayError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound,
    Internal(String),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(e) => write!(f, "bad request: {}", e),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::NotFound => write!(f, "not found"),
            Self::Internal(e) => write!(f, "internal error: {}", e),
        }
    }
}

impl std::error::Error for GatewayError {}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad request").into_response(),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "").into_response(),
            Self::Forbidden => (StatusCode::FORBIDDEN, "").into_response(),
            Self::NotFound => (StatusCode::NOT_FOUND, "").into_response(),
            Self::Internal(e) => {
                tracing::error!("request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "").into_response()
            }
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => Self::NotFound,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<SerializeError> for GatewayError {
    fn from(e: SerializeError) -> Self {
        Self::Internal(e.to_string())
    }
}
