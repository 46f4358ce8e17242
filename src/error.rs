//! Error kinds shared by the conversation service and the gateway relay

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum RelayError {
    /// A required field is missing or has the wrong shape
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// The upstream could not be reached
    #[error("Upstream transport error: {0}")]
    UpstreamTransport(String),

    /// The upstream answered, but not with what we expected
    #[error("Upstream response error: {0}")]
    UpstreamResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::UpstreamTransport(_) | RelayError::UpstreamResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
            RelayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RelayError::UpstreamResponse(err.to_string())
        } else {
            RelayError::UpstreamTransport(err.to_string())
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::warn!(%status, error = %self, "request failed");
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
