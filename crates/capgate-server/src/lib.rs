//! # capgate-server
//!
//! Axum HTTP gateway in front of the caption fetcher.
//!
//! - `GET /api/transcript/{video_id}`: validate, authenticate, admit, fetch
//! - `GET /health`, `GET /api/agent`, `GET /metrics`
//! - Per-key fixed-window admission with a background sweep
//! - Request ids, trace spans, panic-to-500, graceful shutdown via
//!   `CancellationToken`
//!
//! ## Crate Position
//!
//! Depends on: capgate-core, capgate-fetch.
//! Depended on by: capgate.

#![deny(unsafe_code)]

pub mod agent_docs;
pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod limiter;
pub mod metrics;
pub mod pipeline;
pub mod server;
pub mod shutdown;

pub use auth::{AuthOutcome, Authenticator};
pub use config::ServerConfig;
pub use errors::{ErrorResponse, GatewayError};
pub use limiter::{Admission, AdmissionLimiter, Clock, LimiterConfig, ManualClock, SystemClock};
pub use pipeline::TranscriptPipeline;
pub use server::{AppState, GatewayServer};
pub use shutdown::{ShutdownCoordinator, shutdown_signal};
