//! # capgate-core
//!
//! Foundation types shared by every capgate crate:
//!
//! - [`VideoId`]: validated 11-character video identifier
//! - [`VideoMetadata`] and [`TranscriptResult`]: values produced by a fetch
//! - [`ErrorKind`]: the client-facing error taxonomy and its wire mapping
//! - [`logging::init_subscriber`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::{ErrorKind, VideoIdError};
pub use logging::LogFormat;
pub use types::{TranscriptResult, VideoId, VideoMetadata};
