//! The transcript request pipeline.
//!
//! Checks run in a fixed order: video-id shape, service secret present,
//! credential, admission, then the fetch. A request that fails an earlier
//! check never reaches a later one, so malformed or unauthenticated traffic
//! consumes no rate-limit budget and never starts a subprocess.

use std::sync::Arc;
use std::time::Instant;

use capgate_core::{TranscriptResult, VideoId};
use capgate_fetch::FetchExecutor;
use tracing::{error, info, warn};

use crate::auth::{AuthOutcome, Authenticator};
use crate::errors::GatewayError;
use crate::limiter::{Admission, AdmissionLimiter};
use crate::metrics::{RATE_LIMIT_DENIALS_TOTAL, TRANSCRIPT_REQUESTS_TOTAL};

/// Explicitly constructed request state: secret, windows, and executor.
pub struct TranscriptPipeline {
    auth: Authenticator,
    limiter: Arc<AdmissionLimiter>,
    executor: Arc<FetchExecutor>,
}

impl TranscriptPipeline {
    /// Assemble a pipeline.
    pub fn new(
        auth: Authenticator,
        limiter: Arc<AdmissionLimiter>,
        executor: Arc<FetchExecutor>,
    ) -> Self {
        Self {
            auth,
            limiter,
            executor,
        }
    }

    /// The admission limiter, shared with the sweep task.
    pub fn limiter(&self) -> &Arc<AdmissionLimiter> {
        &self.limiter
    }

    /// The authenticator.
    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    /// Handle one request for `raw_id` presenting `credential`.
    pub async fn handle(
        &self,
        credential: Option<&str>,
        raw_id: &str,
    ) -> Result<TranscriptResult, GatewayError> {
        let start = Instant::now();
        let result = self.run(credential, raw_id).await;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let outcome = match &result {
            Ok(transcript) => {
                info!(
                    video_id = raw_id,
                    duration_ms,
                    chars = transcript.text.len(),
                    "transcript served"
                );
                "ok"
            }
            Err(e) => e.kind().as_str(),
        };
        metrics::counter!(TRANSCRIPT_REQUESTS_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn run(
        &self,
        credential: Option<&str>,
        raw_id: &str,
    ) -> Result<TranscriptResult, GatewayError> {
        let video_id = VideoId::parse(raw_id).inspect_err(|e| {
            info!(video_id = raw_id, error = %e, "rejected video id");
        })?;

        match self.auth.authenticate(credential) {
            AuthOutcome::Accepted => {}
            AuthOutcome::MissingConfig => {
                error!("API key is not configured; refusing protected request");
                return Err(GatewayError::MissingSecret);
            }
            AuthOutcome::MissingCredential => {
                warn!(video_id = %video_id, "request without API key");
                return Err(GatewayError::MissingCredential);
            }
            AuthOutcome::Mismatched => {
                warn!(video_id = %video_id, "request with invalid API key");
                return Err(GatewayError::InvalidCredential);
            }
        }

        if let Admission::Denied { retry_after_secs } = self.limiter.admit(credential) {
            metrics::counter!(RATE_LIMIT_DENIALS_TOTAL).increment(1);
            info!(video_id = %video_id, retry_after_secs, "rate limited");
            return Err(GatewayError::RateLimited { retry_after_secs });
        }

        self.executor.fetch_transcript(&video_id).await.map_err(|e| {
            warn!(
                video_id = %video_id,
                error = %e,
                reason = e.label(),
                transient = e.is_transient(),
                kind = e.client_kind().as_str(),
                "transcript fetch failed"
            );
            GatewayError::Fetch(e)
        })
    }
}
