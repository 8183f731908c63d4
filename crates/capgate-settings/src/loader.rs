//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`GatewaySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use capgate_core::LogFormat;
use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::GatewaySettings;

/// Resolve the default settings file path (`~/.capgate/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".capgate").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<GatewaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults (plus env overrides). If the
/// file contains invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<GatewaySettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<GatewaySettings> {
    let defaults = serde_json::to_value(GatewaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CAPGATE_*` environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut GatewaySettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup` (testable without touching the
/// process environment).
///
/// Each variable has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Empty strings count as unset
/// - Invalid values are logged and ignored (fall back to file/default)
pub fn apply_overrides_from<F>(settings: &mut GatewaySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("CAPGATE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("CAPGATE_PORT", 1, 65535) {
        settings.server.port = v;
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = env.string("CAPGATE_API_KEY") {
        settings.auth.api_key = Some(v);
    }

    // ── Rate limit ──────────────────────────────────────────────────
    if let Some(v) = env.u64("CAPGATE_RATE_LIMIT_WINDOW_SECS", 1, 86_400) {
        settings.rate_limit.window_secs = v;
    }
    if let Some(v) = env.u64("CAPGATE_RATE_LIMIT_MAX_REQUESTS", 1, 10_000) {
        // range-checked above
        settings.rate_limit.max_requests = u32::try_from(v).unwrap_or(u32::MAX);
    }
    if let Some(v) = env.u64("CAPGATE_RATE_LIMIT_SWEEP_SECS", 1, 86_400) {
        settings.rate_limit.sweep_interval_secs = v;
    }

    // ── Fetch ───────────────────────────────────────────────────────
    if let Some(v) = env.string("CAPGATE_FETCH_PROGRAM") {
        settings.fetch.program = v;
    }
    if let Some(v) = env.u64("CAPGATE_FETCH_TIMEOUT_MS", 1000, 600_000) {
        settings.fetch.timeout_ms = v;
    }
    if let Some(v) = env.string("CAPGATE_FETCH_LANGUAGE") {
        settings.fetch.language = v;
    }
    if let Some(v) = env.string("CAPGATE_WORK_DIR") {
        settings.fetch.work_dir = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("CAPGATE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("CAPGATE_LOG_FORMAT") {
        match LogFormat::parse(&v) {
            Some(format) => settings.logging.format = format,
            None => {
                tracing::warn!(
                    key = "CAPGATE_LOG_FORMAT",
                    value = %v,
                    "invalid log format, ignoring"
                );
            }
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = self.string(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overrides(pairs: &[(&str, &str)]) -> GatewaySettings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut settings = GatewaySettings::default();
        apply_overrides_from(&mut settings, |name| vars.get(name).cloned());
        settings
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "server": {"port": 3000, "host": "0.0.0.0"}
        });
        let source = serde_json::json!({
            "server": {"port": 9090}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"extraArgs": ["--a", "--b"]});
        let source = serde_json::json!({"extraArgs": ["--c"]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["extraArgs"], serde_json::json!(["--c"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_fills_null_target() {
        let target = serde_json::json!({"apiKey": null});
        let source = serde_json::json!({"apiKey": "k"});
        let merged = deep_merge(target, source);
        assert_eq!(merged["apiKey"], "k");
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 42);
    }

    // ── load_file_layer / load_settings_from_path ───────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let path = Path::new("/nonexistent/capgate/settings.json");
        let settings = load_file_layer(path).unwrap();
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.fetch.program, "yt-dlp");
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"auth": {"apiKey": "from-file"}, "rateLimit": {"windowSecs": 60}, "fetch": {"extraArgs": ["--proxy", "socks5://x"]}}"#,
        )
        .unwrap();

        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.auth.secret(), Some("from-file"));
        assert_eq!(settings.rate_limit.window_secs, 60);
        assert_eq!(settings.rate_limit.max_requests, 1);
        assert_eq!(settings.fetch.extra_args, vec!["--proxy", "socks5://x"]);
        assert_eq!(settings.fetch.timeout_ms, 30_000);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_file_layer(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn unreadable_path_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_file_layer(dir.path()).unwrap_err();
        assert!(matches!(&err, SettingsError::Read { path, .. } if path == dir.path()));
    }

    #[test]
    fn load_wrong_type_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": "eighty"}}"#).unwrap();

        assert!(matches!(load_file_layer(&path), Err(SettingsError::Json(_))));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"fetch": {"timeoutMs": 0}}"#).unwrap();

        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue { field: "fetch.timeoutMs", .. })
        ));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let settings = overrides(&[
            ("CAPGATE_HOST", "127.0.0.1"),
            ("CAPGATE_PORT", "8080"),
            ("CAPGATE_API_KEY", "env-secret"),
            ("CAPGATE_RATE_LIMIT_WINDOW_SECS", "10"),
            ("CAPGATE_RATE_LIMIT_MAX_REQUESTS", "3"),
            ("CAPGATE_FETCH_PROGRAM", "/usr/local/bin/yt-dlp"),
            ("CAPGATE_FETCH_TIMEOUT_MS", "5000"),
            ("CAPGATE_FETCH_LANGUAGE", "fr"),
            ("CAPGATE_WORK_DIR", "/var/tmp/capgate"),
            ("CAPGATE_LOG_LEVEL", "debug"),
            ("CAPGATE_LOG_FORMAT", "json"),
        ]);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.auth.secret(), Some("env-secret"));
        assert_eq!(settings.rate_limit.window_secs, 10);
        assert_eq!(settings.rate_limit.max_requests, 3);
        assert_eq!(settings.fetch.program, "/usr/local/bin/yt-dlp");
        assert_eq!(settings.fetch.timeout_ms, 5000);
        assert_eq!(settings.fetch.language, "fr");
        assert_eq!(settings.fetch.work_dir.as_deref(), Some("/var/tmp/capgate"));
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let settings = overrides(&[
            ("CAPGATE_PORT", "0"),
            ("CAPGATE_FETCH_TIMEOUT_MS", "10"),
            ("CAPGATE_RATE_LIMIT_WINDOW_SECS", "soon"),
            ("CAPGATE_LOG_FORMAT", "xml"),
        ]);
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.fetch.timeout_ms, 30_000);
        assert_eq!(settings.rate_limit.window_secs, 30);
        assert_eq!(settings.logging.format, LogFormat::Compact);
    }

    #[test]
    fn empty_env_values_are_unset() {
        let settings = overrides(&[("CAPGATE_API_KEY", ""), ("CAPGATE_HOST", "")]);
        assert!(settings.auth.api_key.is_none());
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_u16_bounds() {
        assert_eq!(parse_u16_range("9090", 1, 65535), Some(9090));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("99999", 1, 65535), None);
        assert_eq!(parse_u16_range("", 1, 65535), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("30000", 1000, 600_000), Some(30_000));
        assert_eq!(parse_u64_range("500", 1000, 600_000), None);
        assert_eq!(parse_u64_range("700000", 1000, 600_000), None);
        assert_eq!(parse_u64_range("abc", 1000, 600_000), None);
    }
}
