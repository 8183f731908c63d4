//! Machine-readable API description served at `/api/agent`.

use serde_json::{Value, json};

/// Static description of the gateway's endpoints, aimed at automated clients.
pub fn agent_docs() -> Value {
    json!({
        "name": "capgate",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Returns the plain-text caption transcript of a video.",
        "authentication": {
            "type": "apiKey",
            "header": "X-API-Key",
            "required_for": ["/api/transcript/{videoId}"]
        },
        "rate_limit": {
            "scope": "per API key",
            "policy": "fixed window",
            "on_limit": "429 with a Retry-After header (seconds)"
        },
        "endpoints": [
            {
                "method": "GET",
                "path": "/api/transcript/{videoId}",
                "params": {
                    "videoId": "11 characters from [A-Za-z0-9_-]"
                },
                "response": {
                    "content_type": "text/plain; charset=utf-8",
                    "body": "normalized transcript text",
                    "headers": {
                        "X-Video-Title": "percent-encoded title",
                        "X-Video-Duration": "duration in whole seconds",
                        "X-Video-Timestamp": "ISO-8601 UTC completion time"
                    }
                },
                "errors": {
                    "400": "Invalid video ID format / Video ID is required",
                    "401": "Invalid or missing API key",
                    "404": "No transcript available",
                    "429": "Rate limit exceeded. Please try again later.",
                    "500": "Internal server error",
                    "504": "Request timeout"
                }
            },
            {
                "method": "GET",
                "path": "/health",
                "response": {"status": "healthy"}
            },
            {
                "method": "GET",
                "path": "/metrics",
                "response": "Prometheus text exposition"
            }
        ],
        "error_format": {"error": "message"}
    })
}
