//! Settings types.
//!
//! Every struct uses `#[serde(default)]` so a settings file only needs the
//! keys it overrides. Field names are camelCase on disk.

use capgate_core::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// Listener settings.
    pub server: ServerSettings,
    /// Shared-secret authentication.
    pub auth: AuthSettings,
    /// Per-key admission window.
    pub rate_limit: RateLimitSettings,
    /// External captioning command.
    pub fetch: FetchSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl GatewaySettings {
    /// Reject values no component can work with.
    ///
    /// A missing API key is *not* an error here: the gateway still starts and
    /// answers every protected call with an internal error, which is easier to
    /// diagnose than a crash loop.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.window_secs == 0 {
            return Err(invalid("rateLimit.windowSecs", "must be at least 1"));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(invalid("rateLimit.maxRequests", "must be at least 1"));
        }
        if self.rate_limit.sweep_interval_secs == 0 {
            return Err(invalid("rateLimit.sweepIntervalSecs", "must be at least 1"));
        }
        if self.fetch.program.trim().is_empty() {
            return Err(invalid("fetch.program", "must not be empty"));
        }
        if self.fetch.timeout_ms == 0 {
            return Err(invalid("fetch.timeoutMs", "must be at least 1"));
        }
        if self.fetch.language.trim().is_empty() {
            return Err(invalid("fetch.language", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &'static str) -> SettingsError {
    SettingsError::InvalidValue { field, reason }
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Shared-secret authentication settings.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// The one accepted `X-API-Key` value. `None` means misconfigured.
    pub api_key: Option<String>,
}

impl AuthSettings {
    /// The secret, treating an empty string as unset.
    pub fn secret(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

// Keep the secret out of debug logs.
impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Fixed-window admission settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitSettings {
    /// Window length in seconds.
    pub window_secs: u64,
    /// Accepted requests per credential per window.
    pub max_requests: u32,
    /// How often expired windows are purged, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_secs: 30,
            max_requests: 1,
            sweep_interval_secs: 60,
        }
    }
}

/// External captioning command settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchSettings {
    /// Executable name or path.
    pub program: String,
    /// Arguments inserted before the generated ones.
    pub extra_args: Vec<String>,
    /// Hard wall-clock limit for one invocation, in milliseconds.
    pub timeout_ms: u64,
    /// The single caption language requested.
    pub language: String,
    /// Directory for per-request artifacts. `None` uses the system temp dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,
    /// Prefix the video id is appended to when building the tool's URL.
    pub video_url_prefix: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            extra_args: Vec::new(),
            timeout_ms: 30_000,
            language: "en".to_string(),
            work_dir: None,
            video_url_prefix: "https://www.youtube.com/watch?v=".to_string(),
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
