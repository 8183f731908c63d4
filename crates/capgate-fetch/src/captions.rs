//! Caption document parsing and text normalization.
//!
//! The cue format is json3:
//!
//! ```json
//! {"events": [{"tStartMs": 0, "dDurationMs": 1800, "segs": [{"utf8": "hello "}, {"utf8": "world"}]}]}
//! ```
//!
//! Caption data is external and untrusted. Anything that does not match this
//! shape is a [`CaptionError`], never a panic.

use capgate_core::VideoMetadata;
use serde::Deserialize;
use tracing::debug;

use crate::errors::CaptionError;

/// A parsed caption track.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct CaptionDocument {
    /// Cue events in document order.
    pub events: Vec<CueEvent>,
}

/// One cue.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CueEvent {
    /// Start offset in milliseconds.
    #[serde(default)]
    pub t_start_ms: Option<i64>,
    /// Display duration in milliseconds.
    #[serde(default)]
    pub d_duration_ms: Option<i64>,
    /// Text segments. Window-positioning events carry none.
    #[serde(default)]
    pub segs: Option<Vec<Segment>>,
}

impl CueEvent {
    /// The event's segments concatenated with no separator.
    pub fn text(&self) -> String {
        self.segs
            .iter()
            .flatten()
            .map(|seg| seg.utf8.as_str())
            .collect()
    }
}

/// A run of text inside a cue.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Segment {
    /// Segment text.
    #[serde(default)]
    pub utf8: String,
}

/// Parse a json3 caption document.
pub fn parse_captions(raw: &str) -> Result<CaptionDocument, CaptionError> {
    Ok(serde_json::from_str(raw)?)
}

/// Flatten a document to a single line of text.
///
/// Segments within a cue are concatenated as-is, cues are joined by one
/// space, then every whitespace run collapses to one space and the ends are
/// trimmed. Returns an empty string when there is no visible text.
pub fn normalize(doc: &CaptionDocument) -> String {
    let joined = doc
        .events
        .iter()
        .map(CueEvent::text)
        .collect::<Vec<_>>()
        .join(" ");
    normalize_text(&joined)
}

/// Collapse whitespace runs to one space and trim. Idempotent.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Deserialize)]
struct RawMetadata {
    title: Option<String>,
    duration: Option<f64>,
}

/// Read title and duration from the tool's stdout.
///
/// The tool prints one JSON object per line; diagnostic lines may surround
/// it. The last line that parses as an object with a title or duration wins.
/// Returns `None` when nothing usable is found, and the caller substitutes
/// placeholder metadata.
pub fn parse_metadata(stdout: &str) -> Option<VideoMetadata> {
    let raw = stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str::<RawMetadata>(line).ok())
        .find(|meta| meta.title.is_some() || meta.duration.is_some());

    let Some(raw) = raw else {
        debug!("no metadata object in tool output");
        return None;
    };

    let title = raw
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| VideoMetadata::UNKNOWN_TITLE.to_owned());
    Some(VideoMetadata {
        title,
        duration_secs: raw.duration.map_or(0, whole_seconds),
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_seconds(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        secs.round() as u64
    } else {
        0
    }
}
