//! Errors raised by hooks and request handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tournament::{ScoreError, UnknownCollection};

use crate::persistence::PersistenceError;

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// Malformed request input.
    #[error("invalid request: {0}")]
    Validation(String),
    /// The request would leave the data in an inconsistent state.
    #[error("{0}")]
    Integrity(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl HookError {
    pub fn validation(message: impl Into<String>) -> Self {
        HookError::Validation(message.into())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        HookError::Integrity(message.into())
    }

    /// Status for the generic record endpoints.
    pub fn status_code(&self) -> StatusCode {
        match self {
            HookError::Validation(_) => StatusCode::BAD_REQUEST,
            HookError::Persistence(PersistenceError::NotFound { .. }) => StatusCode::NOT_FOUND,
            HookError::Persistence(PersistenceError::UnknownCollection(_)) => StatusCode::NOT_FOUND,
            HookError::Integrity(_) | HookError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Status for the custom endpoints, which only distinguish bad input
    /// from everything else.
    pub fn custom_status_code(&self) -> StatusCode {
        match self {
            HookError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ScoreError> for HookError {
    fn from(e: ScoreError) -> Self {
        HookError::Validation(e.to_string())
    }
}

impl From<UnknownCollection> for HookError {
    fn from(e: UnknownCollection) -> Self {
        HookError::Persistence(e.into())
    }
}

impl IntoResponse for HookError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }
        let body = serde_json::json!({
            "code": status.as_u16(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
