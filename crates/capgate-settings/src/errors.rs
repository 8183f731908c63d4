//! Why a settings file could not be turned into a [`GatewaySettings`].
//!
//! [`GatewaySettings`]: crate::GatewaySettings

use std::path::PathBuf;

use thiserror::Error;

/// Load or validation failure. Startup aborts on any of these.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not JSON, or a key has the wrong type.
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),
    /// A value parsed but is outside what the gateway can run with.
    #[error("{field} {reason}")]
    InvalidValue {
        /// camelCase path of the offending key, e.g. `rateLimit.windowSecs`.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Result alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
