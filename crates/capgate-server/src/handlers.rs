//! Axum handlers.

use axum::Json;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use capgate_core::{TranscriptResult, VideoIdError};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;

use crate::agent_docs;
use crate::errors::GatewayError;
use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::server::AppState;

/// Header carrying the shared secret.
pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");
/// Percent-encoded video title.
pub const VIDEO_TITLE_HEADER: HeaderName = HeaderName::from_static("x-video-title");
/// Duration in whole seconds.
pub const VIDEO_DURATION_HEADER: HeaderName = HeaderName::from_static("x-video-duration");
/// Completion time, ISO-8601 UTC.
pub const VIDEO_TIMESTAMP_HEADER: HeaderName = HeaderName::from_static("x-video-timestamp");

/// Characters `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(health::health_check())
}

/// GET /api/agent
pub async fn agent_docs_handler() -> Json<Value> {
    Json(agent_docs::agent_docs())
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(&state.metrics),
    )
}

/// GET /api/transcript/{video_id}
///
/// A segment axum cannot decode (invalid percent-encoded UTF-8) can never be a
/// valid id, so it gets the same JSON 400 as any other malformed id.
pub async fn transcript_handler(
    State(state): State<AppState>,
    video_id: Result<Path<String>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    let video_id = match video_id {
        Ok(Path(video_id)) => video_id,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "undecodable video id segment");
            return GatewayError::InvalidVideoId(VideoIdError::Malformed).into_response();
        }
    };
    let credential = api_key(&headers);
    match state.pipeline.handle(credential, &video_id).await {
        Ok(result) => transcript_response(&result),
        Err(e) => e.into_response(),
    }
}

/// GET /api/transcript and /api/transcript/
pub async fn missing_video_id_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    match state.pipeline.handle(api_key(&headers), "").await {
        Ok(result) => transcript_response(&result),
        Err(e) => e.into_response(),
    }
}

fn api_key(headers: &HeaderMap) -> Option<&str> {
    headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok())
}

/// Encode a title the way `encodeURIComponent` does.
pub fn encode_title(title: &str) -> String {
    utf8_percent_encode(title, URI_COMPONENT).to_string()
}

fn transcript_response(result: &TranscriptResult) -> Response {
    let mut headers = HeaderMap::new();
    let _ = headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    // percent-encoded output is always visible ASCII
    if let Ok(title) = HeaderValue::from_str(&encode_title(&result.title)) {
        let _ = headers.insert(VIDEO_TITLE_HEADER, title);
    }
    let _ = headers.insert(VIDEO_DURATION_HEADER, HeaderValue::from(result.duration_secs));
    if let Ok(timestamp) = HeaderValue::from_str(&result.timestamp_iso()) {
        let _ = headers.insert(VIDEO_TIMESTAMP_HEADER, timestamp);
    }
    (StatusCode::OK, headers, result.text.clone()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_encoding_matches_uri_component() {
        assert_eq!(encode_title("Never Gonna Give You Up"), "Never%20Gonna%20Give%20You%20Up");
        assert_eq!(encode_title("a/b?c=d&e"), "a%2Fb%3Fc%3Dd%26e");
        assert_eq!(encode_title("it's (live)!*~._-"), "it's%20(live)!*~._-");
        assert_eq!(encode_title("café"), "caf%C3%A9");
        assert_eq!(encode_title("line\nbreak"), "line%0Abreak");
    }

    #[test]
    fn api_key_reads_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(api_key(&headers), None);
        let _ = headers.insert(API_KEY_HEADER, HeaderValue::from_static("k"));
        assert_eq!(api_key(&headers), Some("k"));
    }

    #[test]
    fn success_response_headers() {
        let result = TranscriptResult::new(
            "hello".into(),
            capgate_core::VideoMetadata {
                title: "Tëst title".into(),
                duration_secs: 61,
            },
        );
        let response = transcript_response(&result);
        assert_eq!(response.status(), StatusCode::OK);
        let h = response.headers();
        assert_eq!(h[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(h[VIDEO_TITLE_HEADER], "T%C3%ABst%20title");
        assert_eq!(h[VIDEO_DURATION_HEADER], "61");
        assert!(h[VIDEO_TIMESTAMP_HEADER].to_str().unwrap().ends_with('Z'));
    }
}
