//! Fetch and caption error types.
//!
//! These stay narrow so logs and tests can tell failure modes apart. The
//! single collapse to a client-facing kind is [`FetchError::client_kind`].

use std::io;

use capgate_core::ErrorKind;
use thiserror::Error;

/// Caption document could not be parsed.
#[derive(Debug, Error)]
pub enum CaptionError {
    /// Not JSON, or JSON that does not match the cue schema.
    #[error("caption document does not match the cue schema: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Errors from one fetch of a caption track.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The captioning program could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The command ran past its time bound and was killed.
    #[error("captioning command timed out after {timeout_ms}ms")]
    Timeout {
        /// The bound that was exceeded.
        timeout_ms: u64,
    },

    /// The tool reported the video or its captions as unavailable.
    #[error("video unavailable: {reason}")]
    Unavailable {
        /// First stderr line naming the reason.
        reason: String,
    },

    /// Non-zero exit without a recognised availability marker.
    #[error("captioning command exited with code {exit_code}: {stderr}")]
    ProcessFailed {
        /// Exit code (`-1` when killed by a signal).
        exit_code: i32,
        /// Trimmed stderr.
        stderr: String,
    },

    /// The command succeeded but wrote no caption file.
    #[error("no captions produced")]
    NoCaptions,

    /// The caption file is not a valid cue document.
    #[error("malformed caption data: {0}")]
    MalformedCaptions(#[from] CaptionError),

    /// Every cue was empty or whitespace.
    #[error("transcript empty after normalization")]
    EmptyTranscript,

    /// Filesystem error around the artifact.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl FetchError {
    /// Client-facing kind. Everything but an explicit timeout becomes
    /// `NotFound` so engine internals never reach the caller.
    pub fn client_kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            _ => ErrorKind::NotFound,
        }
    }

    /// Whether a retry could plausibly succeed.
    ///
    /// Logged and counted separately; the wire response is the same.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::ProcessFailed { .. } | Self::Io(_)
        )
    }

    /// Stable label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "spawn",
            Self::Timeout { .. } => "timeout",
            Self::Unavailable { .. } => "unavailable",
            Self::ProcessFailed { .. } => "process_failed",
            Self::NoCaptions => "no_captions",
            Self::MalformedCaptions(_) => "malformed_captions",
            Self::EmptyTranscript => "empty_transcript",
            Self::Io(_) => "io",
        }
    }
}
