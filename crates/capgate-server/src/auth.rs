//! Shared-secret authentication.
//!
//! One process-wide secret, one header. The secret is never stored in
//! plain form after construction; both sides are hashed to SHA-256 and the
//! digests compared with a fold that touches every byte.

use std::fmt;

use sha2::{Digest, Sha256};

/// Result of checking a presented credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    /// No secret is configured; nothing can be accepted.
    MissingConfig,
    /// No credential (or an empty one) was presented.
    MissingCredential,
    /// A credential was presented and does not match.
    Mismatched,
    /// The credential matches.
    Accepted,
}

/// Validates the `X-API-Key` header against the configured secret.
#[derive(Clone)]
pub struct Authenticator {
    secret_digest: Option<[u8; 32]>,
}

impl Authenticator {
    /// Build from the configured secret. `None` and `""` both mean
    /// unconfigured.
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            secret_digest: secret.filter(|s| !s.is_empty()).map(digest),
        }
    }

    /// Whether a secret was configured.
    pub fn is_configured(&self) -> bool {
        self.secret_digest.is_some()
    }

    /// Check `presented`. Pure; no side effects.
    pub fn authenticate(&self, presented: Option<&str>) -> AuthOutcome {
        let Some(expected) = &self.secret_digest else {
            return AuthOutcome::MissingConfig;
        };
        let Some(presented) = presented.filter(|p| !p.is_empty()) else {
            return AuthOutcome::MissingCredential;
        };
        if digests_equal(expected, &digest(presented)) {
            AuthOutcome::Accepted
        } else {
            AuthOutcome::Mismatched
        }
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("configured", &self.is_configured())
            .finish()
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

fn digests_equal(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
