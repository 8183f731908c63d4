//! Per-request artifact naming and guaranteed cleanup.
//!
//! An [`ArtifactGuard`] owns a random token inside the work directory. Every
//! file the captioning tool writes for the request starts with `<token>.`,
//! and all of them are removed when the guard is dropped: on success, on
//! error, on timeout, and when the request future itself is cancelled.

use std::io;
use std::path::PathBuf;

use tracing::{debug, warn};
use uuid::Uuid;

/// Artifact cleanup failures (counter).
pub const ARTIFACT_CLEANUP_FAILURES_TOTAL: &str = "artifact_cleanup_failures_total";

/// Scoped ownership of one request's artifact files.
#[derive(Debug)]
pub struct ArtifactGuard {
    dir: PathBuf,
    token: String,
}

impl ArtifactGuard {
    /// Claim a fresh, collision-resistant token in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            token: Uuid::new_v4().simple().to_string(),
        }
    }

    /// The random token shared by every file of this request.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Output template handed to the tool; it substitutes `%(ext)s`.
    pub fn output_template(&self) -> PathBuf {
        self.dir.join(format!("{}.%(ext)s", self.token))
    }

    /// Where the tool writes the caption track for `language`.
    pub fn caption_path(&self, language: &str) -> PathBuf {
        self.dir.join(format!("{}.{language}.json3", self.token))
    }

    /// Files currently on disk that belong to this request.
    pub fn existing_files(&self) -> io::Result<Vec<PathBuf>> {
        let prefix = format!("{}.", self.token);
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                files.push(entry.path());
            }
        }
        Ok(files)
    }

    /// Remove every file belonging to this request.
    ///
    /// Returns how many files were removed. Failures are logged and counted,
    /// never surfaced; they do not change the response.
    pub fn cleanup(&self) -> usize {
        let files = match self.existing_files() {
            Ok(files) => files,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "failed to scan artifact dir");
                metrics::counter!(ARTIFACT_CLEANUP_FAILURES_TOTAL).increment(1);
                return 0;
            }
        };

        let mut removed = 0;
        for path in files {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                // raced with another remover; nothing left to do
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove artifact");
                    metrics::counter!(ARTIFACT_CLEANUP_FAILURES_TOTAL).increment(1);
                }
            }
        }
        if removed > 0 {
            debug!(token = %self.token, removed, "artifacts removed");
        }
        removed
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tokens_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let tokens: HashSet<String> = (0..1_000)
            .map(|_| ArtifactGuard::new(dir.path()).token().to_owned())
            .collect();
        assert_eq!(tokens.len(), 1_000);
    }

    #[test]
    fn paths_share_token() {
        let guard = ArtifactGuard::new("/work");
        let token = guard.token().to_owned();
        assert_eq!(token.len(), 32);
        assert_eq!(
            guard.output_template(),
            PathBuf::from(format!("/work/{token}.%(ext)s"))
        );
        assert_eq!(
            guard.caption_path("en"),
            PathBuf::from(format!("/work/{token}.en.json3"))
        );
    }

    #[test]
    fn drop_removes_all_request_files() {
        let dir = tempfile::tempdir().unwrap();
        let guard = ArtifactGuard::new(dir.path());
        let captions = guard.caption_path("en");
        let partial = dir.path().join(format!("{}.en.json3.part", guard.token()));
        std::fs::write(&captions, "{}").unwrap();
        std::fs::write(&partial, "").unwrap();

        drop(guard);

        assert!(!captions.exists());
        assert!(!partial.exists());
    }

    #[test]
    fn drop_leaves_other_requests_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mine = ArtifactGuard::new(dir.path());
        let theirs = ArtifactGuard::new(dir.path());
        std::fs::write(mine.caption_path("en"), "{}").unwrap();
        std::fs::write(theirs.caption_path("en"), "{}").unwrap();
        let unrelated = dir.path().join("settings.json");
        std::fs::write(&unrelated, "{}").unwrap();

        let theirs_path = theirs.caption_path("en");
        drop(mine);

        assert!(theirs_path.exists());
        assert!(unrelated.exists());
        drop(theirs);
        assert!(!theirs_path.exists());
    }

    #[test]
    fn cleanup_counts_removed_files() {
        let dir = tempfile::tempdir().unwrap();
        let guard = ArtifactGuard::new(dir.path());
        assert_eq!(guard.cleanup(), 0);
        std::fs::write(guard.caption_path("en"), "{}").unwrap();
        assert_eq!(guard.existing_files().unwrap().len(), 1);
        assert_eq!(guard.cleanup(), 1);
        assert!(guard.existing_files().unwrap().is_empty());
    }

    #[test]
    fn missing_dir_is_not_an_error() {
        let guard = ArtifactGuard::new("/nonexistent/capgate/work");
        assert_eq!(guard.cleanup(), 0);
    }

    #[test]
    fn token_prefix_needs_dot() {
        // a file merely starting with the token characters is not ours
        let dir = tempfile::tempdir().unwrap();
        let guard = ArtifactGuard::new(dir.path());
        let lookalike = dir.path().join(format!("{}extra", guard.token()));
        std::fs::write(&lookalike, "").unwrap();
        drop(guard);
        assert!(lookalike.exists());
    }
}
