//! Value types passed between the pipeline stages.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::VideoIdError;

/// Exact length of a video identifier.
pub const VIDEO_ID_LENGTH: usize = 11;

/// A validated video identifier: 11 characters from `[A-Za-z0-9_-]`.
///
/// Opaque beyond its shape. Holding a `VideoId` proves the check ran, so the
/// fetch layer never sees malformed input.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    /// Validate a raw path parameter.
    pub fn parse(raw: &str) -> Result<Self, VideoIdError> {
        if raw.is_empty() {
            return Err(VideoIdError::Missing);
        }
        let well_formed = raw.len() == VIDEO_ID_LENGTH
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if well_formed {
            Ok(Self(raw.to_owned()))
        } else {
            Err(VideoIdError::Malformed)
        }
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VideoId {
    type Err = VideoIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for VideoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Title and duration reported by the captioning tool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Video title.
    pub title: String,
    /// Duration in whole seconds.
    pub duration_secs: u64,
}

impl VideoMetadata {
    /// Title used when the tool's metadata could not be read.
    pub const UNKNOWN_TITLE: &'static str = "Unknown";

    /// Placeholder metadata for when the tool's output is unusable.
    pub fn placeholder() -> Self {
        Self {
            title: Self::UNKNOWN_TITLE.to_owned(),
            duration_secs: 0,
        }
    }
}

impl Default for VideoMetadata {
    fn default() -> Self {
        Self::placeholder()
    }
}

/// A finished transcript. Produced once per successful request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TranscriptResult {
    /// Normalized transcript text (never empty).
    pub text: String,
    /// Video title.
    pub title: String,
    /// Duration in whole seconds.
    pub duration_secs: u64,
    /// When the transcript was completed.
    pub timestamp: DateTime<Utc>,
}

impl TranscriptResult {
    /// Build a result stamped with the current time.
    pub fn new(text: String, metadata: VideoMetadata) -> Self {
        Self {
            text,
            title: metadata.title,
            duration_secs: metadata.duration_secs,
            timestamp: Utc::now(),
        }
    }

    /// ISO-8601 timestamp with millisecond precision and a `Z` suffix.
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}
