//! The fetch executor: one external command run per request.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use capgate_core::{TranscriptResult, VideoId, VideoMetadata};
use tracing::{debug, info, warn};

use crate::artifact::ArtifactGuard;
use crate::captions::{normalize, parse_captions, parse_metadata};
use crate::errors::FetchError;
use crate::process::{ProcessRunner, ProcessSpec, TokioProcessRunner};

/// Fetch duration in seconds (histogram, labels: outcome).
pub const FETCH_DURATION_SECONDS: &str = "transcript_fetch_duration_seconds";

/// Stderr fragments (lowercased) meaning the video or its captions are not
/// available, as opposed to the tool itself failing.
const UNAVAILABLE_MARKERS: &[&str] = &[
    "video unavailable",
    "private video",
    "this video is not available",
    "has been removed",
    "there are no subtitles",
    "no subtitles",
    "subtitles are disabled",
    "members-only",
    "sign in to confirm your age",
];

/// How to invoke the captioning command.
#[derive(Clone, Debug)]
pub struct FetchConfig {
    /// Executable name or path.
    pub program: String,
    /// Arguments inserted before the generated ones.
    pub extra_args: Vec<String>,
    /// Hard wall-clock bound per invocation.
    pub timeout: Duration,
    /// The single caption language requested.
    pub language: String,
    /// Directory for per-request artifacts.
    pub work_dir: PathBuf,
    /// Prefix the video id is appended to.
    pub video_url_prefix: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            program: "yt-dlp".into(),
            extra_args: Vec::new(),
            timeout: Duration::from_secs(30),
            language: "en".into(),
            work_dir: std::env::temp_dir(),
            video_url_prefix: "https://www.youtube.com/watch?v=".into(),
        }
    }
}

/// Raw result of one fetch, before normalization.
#[derive(Clone, Debug)]
pub struct FetchOutput {
    /// Contents of the caption artifact.
    pub captions: String,
    /// Title and duration (placeholder when unreadable).
    pub metadata: VideoMetadata,
}

/// Runs the captioning command and owns the artifact lifecycle.
pub struct FetchExecutor {
    config: FetchConfig,
    runner: Arc<dyn ProcessRunner>,
}

impl FetchExecutor {
    /// Create an executor with an explicit process runner.
    pub fn new(config: FetchConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    /// Create an executor that spawns real processes.
    pub fn with_tokio_runner(config: FetchConfig) -> Self {
        Self::new(config, Arc::new(TokioProcessRunner))
    }

    /// The executor's configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Build the argument list for `video_id` writing into `artifact`.
    pub fn build_args(&self, video_id: &VideoId, artifact: &ArtifactGuard) -> Vec<String> {
        let mut args = self.config.extra_args.clone();
        args.extend([
            "--skip-download".to_owned(),
            "--write-subs".to_owned(),
            "--write-auto-subs".to_owned(),
            "--sub-langs".to_owned(),
            self.config.language.clone(),
            "--sub-format".to_owned(),
            "json3".to_owned(),
            "--no-warnings".to_owned(),
            "--print-json".to_owned(),
            "--output".to_owned(),
            artifact.output_template().to_string_lossy().into_owned(),
            format!("{}{}", self.config.video_url_prefix, video_id),
        ]);
        args
    }

    /// Run the command and read its artifact.
    ///
    /// Every file written for this request is removed before this returns,
    /// whatever the outcome. If the returned future is dropped mid-flight the
    /// child is killed and the same cleanup runs on drop.
    pub async fn fetch(&self, video_id: &VideoId) -> Result<FetchOutput, FetchError> {
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let artifact = ArtifactGuard::new(&self.config.work_dir);
        let start = Instant::now();

        let result = self.run_and_read(video_id, &artifact).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.label(),
        };
        metrics::histogram!(FETCH_DURATION_SECONDS, "outcome" => outcome)
            .record(start.elapsed().as_secs_f64());

        drop(artifact);
        result
    }

    /// Fetch, parse, and normalize into a finished transcript.
    pub async fn fetch_transcript(
        &self,
        video_id: &VideoId,
    ) -> Result<TranscriptResult, FetchError> {
        let output = self.fetch(video_id).await?;
        let doc = parse_captions(&output.captions)?;
        let text = normalize(&doc);
        if text.is_empty() {
            return Err(FetchError::EmptyTranscript);
        }
        info!(
            video_id = %video_id,
            cues = doc.events.len(),
            chars = text.len(),
            "transcript ready"
        );
        Ok(TranscriptResult::new(text, output.metadata))
    }

    async fn run_and_read(
        &self,
        video_id: &VideoId,
        artifact: &ArtifactGuard,
    ) -> Result<FetchOutput, FetchError> {
        let spec = ProcessSpec {
            program: self.config.program.clone(),
            args: self.build_args(video_id, artifact),
            working_dir: Some(self.config.work_dir.clone()),
            timeout: self.config.timeout,
        };

        let output = self.runner.run(&spec).await?;

        if output.timed_out {
            return Err(FetchError::Timeout {
                timeout_ms: u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }
        if output.exit_code != 0 {
            return Err(classify_failure(output.exit_code, &output.stderr));
        }

        let metadata = parse_metadata(&output.stdout).unwrap_or_else(|| {
            warn!(video_id = %video_id, "unreadable metadata, using placeholder");
            VideoMetadata::placeholder()
        });

        let path = artifact.caption_path(&self.config.language);
        let captions = match tokio::fs::read_to_string(&path).await {
            Ok(captions) => captions,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(video_id = %video_id, path = %path.display(), "no caption artifact");
                return Err(FetchError::NoCaptions);
            }
            Err(e) => return Err(FetchError::Io(e)),
        };

        Ok(FetchOutput { captions, metadata })
    }
}

/// Turn a non-zero exit into the narrowest error.
fn classify_failure(exit_code: i32, stderr: &str) -> FetchError {
    let lowered = stderr.to_lowercase();
    if UNAVAILABLE_MARKERS.iter().any(|m| lowered.contains(m)) {
        let reason = stderr
            .lines()
            .map(str::trim)
            .find(|line| {
                let line = line.to_lowercase();
                UNAVAILABLE_MARKERS.iter().any(|m| line.contains(m))
            })
            .unwrap_or_default()
            .to_owned();
        return FetchError::Unavailable { reason };
    }
    FetchError::ProcessFailed {
        exit_code,
        stderr: stderr.trim().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ScriptedBehavior, ScriptedRunner};
    use assert_matches::assert_matches;

    const CAPTIONS: &str = r#"{"events": [{"segs": [{"utf8": "hello"}]}, {"segs": [{"utf8": " world "}]}]}"#;
    const META: &str = r#"{"title": "Greeting", "duration": 42}"#;

    fn video() -> VideoId {
        VideoId::parse("dQw4w9WgXcQ").unwrap()
    }

    fn executor(
        dir: &std::path::Path,
        behavior: ScriptedBehavior,
    ) -> (FetchExecutor, Arc<ScriptedRunner>) {
        let runner = Arc::new(ScriptedRunner::new(behavior));
        let config = FetchConfig {
            work_dir: dir.to_path_buf(),
            timeout: Duration::from_millis(200),
            ..FetchConfig::default()
        };
        (FetchExecutor::new(config, runner.clone()), runner)
    }

    fn assert_dir_empty(dir: &std::path::Path) {
        let leftovers: Vec<_> = std::fs::read_dir(dir).unwrap().collect();
        assert!(leftovers.is_empty(), "leftover artifacts: {leftovers:?}");
    }

    #[test]
    fn args_follow_tool_contract() {
        let (exec, _) = executor(std::path::Path::new("/work"), ScriptedBehavior::NoOutput);
        let guard = ArtifactGuard::new("/work");
        let args = exec.build_args(&video(), &guard);
        let lang = args.iter().position(|a| a == "--sub-langs").unwrap();
        assert_eq!(args[lang + 1], "en");
        let out = args.iter().position(|a| a == "--output").unwrap();
        assert_eq!(args[out + 1], format!("/work/{}.%(ext)s", guard.token()));
        assert!(args.contains(&"--skip-download".to_owned()));
        assert!(args.contains(&"--print-json".to_owned()));
        assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }

    #[test]
    fn extra_args_come_first() {
        let config = FetchConfig {
            extra_args: vec!["--proxy".into(), "socks5://127.0.0.1:9050".into()],
            ..FetchConfig::default()
        };
        let runner = Arc::new(ScriptedRunner::new(ScriptedBehavior::NoOutput));
        let exec = FetchExecutor::new(config, runner);
        let args = exec.build_args(&video(), &ArtifactGuard::new("/work"));
        assert_eq!(&args[..2], ["--proxy", "socks5://127.0.0.1:9050"]);
    }

    #[tokio::test]
    async fn success_returns_text_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let (exec, runner) = executor(
            dir.path(),
            ScriptedBehavior::WriteCaptions {
                captions: CAPTIONS.into(),
                stdout: META.into(),
            },
        );

        let result = exec.fetch_transcript(&video()).await.unwrap();
        assert_eq!(result.text, "hello world");
        assert_eq!(result.title, "Greeting");
        assert_eq!(result.duration_secs, 42);
        assert_eq!(runner.calls(), 1);

        let spec = runner.last_spec().unwrap();
        assert_eq!(spec.timeout, Duration::from_millis(200));
        assert_eq!(spec.working_dir.as_deref(), Some(dir.path()));
        assert_eq!(spec.args.last().unwrap(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_dir_empty(dir.path());
    }

    #[tokio::test]
    async fn bad_metadata_falls_back_to_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let (exec, _) = executor(
            dir.path(),
            ScriptedBehavior::WriteCaptions {
                captions: CAPTIONS.into(),
                stdout: "garbage".into(),
            },
        );

        let result = exec.fetch_transcript(&video()).await.unwrap();
        assert_eq!(result.title, "Unknown");
        assert_eq!(result.duration_secs, 0);
        assert_eq!(result.text, "hello world");
    }

    #[tokio::test]
    async fn no_artifact_is_no_captions() {
        let dir = tempfile::tempdir().unwrap();
        let (exec, _) = executor(dir.path(), ScriptedBehavior::NoOutput);
        assert_matches!(exec.fetch(&video()).await, Err(FetchError::NoCaptions));
        assert_dir_empty(dir.path());
    }

    #[tokio::test]
    async fn timeout_is_reported_and_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let (exec, _) = executor(dir.path(), ScriptedBehavior::TimeOut { partial: true });
        assert_matches!(
            exec.fetch(&video()).await,
            Err(FetchError::Timeout { timeout_ms: 200 })
        );
        assert_dir_empty(dir.path());
    }

    #[tokio::test]
    async fn unavailable_marker_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let (exec, _) = executor(
            dir.path(),
            ScriptedBehavior::Exit {
                code: 1,
                stderr: "ERROR: [youtube] T74uZgfu6mU: Private video. Sign in if you've been granted access".into(),
            },
        );
        let err = exec.fetch(&video()).await.unwrap_err();
        assert_matches!(
            &err,
            FetchError::Unavailable { reason } if reason.contains("Private video")
        );
        assert_eq!(err.client_kind(), capgate_core::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn other_failures_are_process_failed() {
        let dir = tempfile::tempdir().unwrap();
        let (exec, _) = executor(
            dir.path(),
            ScriptedBehavior::Exit {
                code: 2,
                stderr: "ERROR: unable to download webpage: HTTP Error 503\n".into(),
            },
        );
        assert_matches!(
            exec.fetch(&video()).await,
            Err(FetchError::ProcessFailed { exit_code: 2, stderr }) if stderr.ends_with("503")
        );
        assert_dir_empty(dir.path());
    }

    #[tokio::test]
    async fn failed_run_with_partial_file_is_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let (exec, _) = executor(
            dir.path(),
            ScriptedBehavior::WriteThenExit {
                captions: CAPTIONS.into(),
                code: 1,
            },
        );
        assert_matches!(exec.fetch(&video()).await, Err(FetchError::ProcessFailed { .. }));
        assert_dir_empty(dir.path());
    }

    #[tokio::test]
    async fn malformed_captions_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (exec, _) = executor(
            dir.path(),
            ScriptedBehavior::WriteCaptions {
                captions: "<xml/>".into(),
                stdout: META.into(),
            },
        );
        assert_matches!(
            exec.fetch_transcript(&video()).await,
            Err(FetchError::MalformedCaptions(_))
        );
        assert_dir_empty(dir.path());
    }

    #[tokio::test]
    async fn whitespace_only_captions_are_empty_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let (exec, _) = executor(
            dir.path(),
            ScriptedBehavior::WriteCaptions {
                captions: r#"{"events": [{"segs": [{"utf8": " \n "}]}]}"#.into(),
                stdout: META.into(),
            },
        );
        assert_matches!(exec.fetch_transcript(&video()).await, Err(FetchError::EmptyTranscript));
        assert_dir_empty(dir.path());
    }

    #[tokio::test]
    async fn cancelled_fetch_is_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let (exec, runner) = executor(dir.path(), ScriptedBehavior::Hang);

        let outcome = tokio::time::timeout(Duration::from_millis(50), exec.fetch(&video())).await;
        assert!(outcome.is_err(), "hanging fetch should not finish");
        assert_eq!(runner.calls(), 1);
        assert_dir_empty(dir.path());
    }

    #[tokio::test]
    async fn concurrent_fetches_use_distinct_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (exec, runner) = executor(
            dir.path(),
            ScriptedBehavior::WriteCaptions {
                captions: CAPTIONS.into(),
                stdout: META.into(),
            },
        );
        let id = video();
        let results = futures::future::join_all((0..8).map(|_| exec.fetch_transcript(&id))).await;
        assert!(results.iter().all(Result::is_ok));

        let outputs = runner.output_paths();
        let unique: std::collections::HashSet<_> = outputs.iter().collect();
        assert_eq!(outputs.len(), 8);
        assert_eq!(unique.len(), 8);
        assert_dir_empty(dir.path());
    }

    #[tokio::test]
    async fn creates_missing_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let (exec, _) = executor(&nested, ScriptedBehavior::NoOutput);
        assert_matches!(exec.fetch(&video()).await, Err(FetchError::NoCaptions));
        assert!(nested.is_dir());
    }

    #[test]
    fn classify_picks_marker_line() {
        let err =
            classify_failure(1, "[youtube] abc: Downloading webpage\nERROR: Video unavailable\n");
        assert_matches!(
            err,
            FetchError::Unavailable { reason } if reason == "ERROR: Video unavailable"
        );
        let err =
            classify_failure(1, "WARNING: There are no subtitles for the requested languages");
        assert_matches!(err, FetchError::Unavailable { .. });
        let err = classify_failure(137, "Killed");
        assert_matches!(err, FetchError::ProcessFailed { exit_code: 137, .. });
    }
}
