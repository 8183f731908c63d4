//! `/health` endpoint.

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"healthy"` while the process is serving.
    pub status: &'static str,
}

/// Liveness only: no dependency is checked and nothing is mutated.
pub fn health_check() -> HealthResponse {
    HealthResponse { status: "healthy" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_healthy() {
        assert_eq!(health_check().status, "healthy");
    }

    #[test]
    fn serializes_to_exact_body() {
        let json = serde_json::to_string(&health_check()).unwrap();
        assert_eq!(json, r#"{"status":"healthy"}"#);
    }
}
