//! Gateway error type and its HTTP rendering.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use capgate_core::{ErrorKind, VideoIdError};
use capgate_fetch::FetchError;
use serde::Serialize;
use thiserror::Error;

/// Everything that can stop a transcript request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The path parameter is not a video identifier.
    #[error(transparent)]
    InvalidVideoId(#[from] VideoIdError),

    /// No API key is configured on the server.
    #[error("service API key is not configured")]
    MissingSecret,

    /// The request carried no API key.
    #[error("missing API key")]
    MissingCredential,

    /// The request carried the wrong API key.
    #[error("API key mismatch")]
    InvalidCredential,

    /// The key's admission window is exhausted.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the window closes.
        retry_after_secs: u64,
    },

    /// The fetch, parse, or normalize step failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl GatewayError {
    /// Collapse to the client-facing kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidVideoId(e) => e.kind(),
            Self::MissingSecret => ErrorKind::Internal,
            Self::MissingCredential | Self::InvalidCredential => ErrorKind::Unauthorized,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Fetch(e) => e.client_kind(),
        }
    }

    /// Message sent to the client. Never contains internal detail.
    pub fn client_message(&self) -> String {
        match self {
            Self::InvalidVideoId(e) => e.to_string(),
            other => other.kind().client_message().to_owned(),
        }
    }
}

/// JSON error body: `{"error": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Client-facing message.
    pub error: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.kind().status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (
            status,
            Json(ErrorResponse {
                error: self.client_message(),
            }),
        )
            .into_response();

        if let Self::RateLimited { retry_after_secs } = self {
            let _ = response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}
