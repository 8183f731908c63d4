//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

pub use capgate_fetch::artifact::ARTIFACT_CLEANUP_FAILURES_TOTAL;
pub use capgate_fetch::executor::FETCH_DURATION_SECONDS;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded; a second call fails.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// A handle not attached to the global recorder, for tests and tools.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across crates.

/// Transcript requests total (counter, labels: outcome).
pub const TRANSCRIPT_REQUESTS_TOTAL: &str = "transcript_requests_total";
/// Rate-limit denials total (counter).
pub const RATE_LIMIT_DENIALS_TOTAL: &str = "rate_limit_denials_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_handle_renders() {
        let handle = detached_handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            TRANSCRIPT_REQUESTS_TOTAL,
            RATE_LIMIT_DENIALS_TOTAL,
            FETCH_DURATION_SECONDS,
            ARTIFACT_CLEANUP_FAILURES_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
