//! Client-facing error taxonomy.
//!
//! Every failure inside the gateway ends up as exactly one [`ErrorKind`].
//! Components keep their own narrow error types; the outer edge of the
//! request pipeline collapses them into a kind, and the HTTP layer turns the
//! kind into a status code and a fixed message. No internal detail crosses
//! that boundary.

use serde::Serialize;
use thiserror::Error;

/// Client-facing error kinds, in precedence order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing video identifier.
    InvalidInput,
    /// Credential absent or wrong.
    Unauthorized,
    /// Credential exhausted its admission window.
    RateLimited,
    /// No usable transcript for this video.
    NotFound,
    /// The external fetch exceeded its time bound.
    Timeout,
    /// Operator-correctable failure (e.g. missing service secret).
    Internal,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    pub fn status_code(self) -> u16 {
        match self {
            Self::InvalidInput => 400,
            Self::Unauthorized => 401,
            Self::NotFound => 404,
            Self::RateLimited => 429,
            Self::Internal => 500,
            Self::Timeout => 504,
        }
    }

    /// Fixed message sent to clients.
    ///
    /// `InvalidInput` carries a request-specific message instead, so this is
    /// only its generic fallback.
    pub fn client_message(self) -> &'static str {
        match self {
            Self::InvalidInput => "Invalid request",
            Self::Unauthorized => "Invalid or missing API key",
            Self::NotFound => "No transcript available",
            Self::RateLimited => "Rate limit exceeded. Please try again later.",
            Self::Internal => "Internal server error",
            Self::Timeout => "Request timeout",
        }
    }

    /// Stable snake_case label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        }
    }
}

/// Reasons a string is not a valid video identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VideoIdError {
    /// The path parameter was absent or empty.
    #[error("Video ID is required")]
    Missing,
    /// Wrong length or characters outside `[A-Za-z0-9_-]`.
    #[error("Invalid video ID format")]
    Malformed,
}

impl VideoIdError {
    /// Validation failures are always client-correctable.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidInput
    }
}
