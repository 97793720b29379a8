//! Proxy failure kinds and the JSON error envelope returned to callers.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from forwarding a request to the worker.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Connection refused, reset or timed out. Never retried.
    #[error("{}", error_chain(.0))]
    Unreachable(reqwest::Error),

    #[error("Worker API responded with status {status}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Worker API returned a non-JSON body: {0}")]
    InvalidResponse(String),

    #[error("Request body is not valid JSON: {0}")]
    InvalidRequestBody(String),

    #[error("HTTP client error: {}", error_chain(.0))]
    Client(reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProxyError {
    /// Sort a reqwest failure into a caller-side or worker-side error.
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::Client(err)
        } else {
            Self::Unreachable(err)
        }
    }

    /// Short, stable label placed in the envelope's `error` field.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "Worker API connection error",
            Self::UpstreamStatus { .. } => "Worker API error response",
            Self::InvalidResponse(_) => "Worker API invalid response",
            Self::InvalidRequestBody(_) => "Invalid request body",
            Self::Client(_) | Self::Config(_) => "Gateway error",
        }
    }

    /// Worker-side failures all collapse to 500; only a malformed inbound
    /// body is the caller's fault.
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.envelope())).into_response()
    }
}

/// Fixed-shape JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub message: String,
}

/// Render an error with its source chain, e.g.
/// `error sending request: client error (Connect): Connection refused`.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
