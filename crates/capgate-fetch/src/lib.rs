//! # capgate-fetch
//!
//! Obtains a caption track for one video by running an external command and
//! turns it into plain text.
//!
//! ```text
//! VideoId → ArtifactGuard (unique token in work dir)
//!         → ProcessRunner (hard timeout, kill on expiry)
//!         → stdout JSON → VideoMetadata (placeholder on failure)
//!         → <token>.<lang>.json3 → CaptionDocument → normalize → text
//!         → guard dropped: every <token>.* file removed
//! ```
//!
//! ## Crate Position
//!
//! Depends on: capgate-core.
//! Depended on by: capgate-server, capgate.

#![deny(unsafe_code)]

pub mod artifact;
pub mod captions;
pub mod errors;
pub mod executor;
pub mod process;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use artifact::ArtifactGuard;
pub use captions::{CaptionDocument, normalize, normalize_text, parse_captions, parse_metadata};
pub use errors::{CaptionError, FetchError};
pub use executor::{FetchConfig, FetchExecutor, FetchOutput};
pub use process::{ProcessOutput, ProcessRunner, ProcessSpec, TokioProcessRunner};
