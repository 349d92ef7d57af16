//! Gateway error types and their HTTP mapping.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use capi_protocol::ProtocolError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Missing authorization token")]
    MissingAuthorization,

    #[error("Invalid authorization header")]
    InvalidAuthorization,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Model not supported stream")]
    StreamingUnsupported { model: String },

    #[error("Failed to encode request: {0}")]
    Encoding(#[from] ProtocolError),

    #[error("upstream transport error: {0}")]
    UpstreamTransport(#[from] reqwest::Error),

    #[error("upstream returned {status}")]
    UpstreamStatus { status: u16, body: String },
}

impl ProxyError {
    /// Message shown to API clients. Upstream details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::UpstreamTransport(_) | Self::UpstreamStatus { .. } => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl ResponseError for ProxyError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingAuthorization | Self::InvalidAuthorization => StatusCode::UNAUTHORIZED,
            Self::InvalidRequest(_) | Self::StreamingUnsupported { .. } | Self::Encoding(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::UpstreamTransport(_) | Self::UpstreamStatus { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.public_message() }))
    }
}
