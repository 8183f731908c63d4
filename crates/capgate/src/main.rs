//! # capgate
//!
//! Caption gateway binary: loads settings, wires the crates together, and
//! serves until ctrl-c or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use capgate_core::logging::init_subscriber;
use capgate_fetch::{FetchConfig, FetchExecutor};
use capgate_server::{
    AdmissionLimiter, Authenticator, GatewayServer, LimiterConfig, ServerConfig, TranscriptPipeline,
    shutdown_signal,
};
use capgate_settings::{FetchSettings, GatewaySettings, RateLimitSettings};
use clap::Parser;

/// Caption gateway server.
#[derive(Parser, Debug)]
#[command(name = "capgate", about = "HTTP gateway returning video caption transcripts")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings, 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.capgate/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn load_settings(&self) -> Result<GatewaySettings> {
        let path = self.config.clone().unwrap_or_else(capgate_settings::settings_path);
        let mut settings = capgate_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        Ok(settings)
    }
}

fn fetch_config(settings: &FetchSettings) -> FetchConfig {
    FetchConfig {
        program: settings.program.clone(),
        extra_args: settings.extra_args.clone(),
        timeout: Duration::from_millis(settings.timeout_ms),
        language: settings.language.clone(),
        work_dir: settings
            .work_dir
            .as_ref()
            .map_or_else(std::env::temp_dir, PathBuf::from),
        video_url_prefix: settings.video_url_prefix.clone(),
    }
}

fn limiter_config(settings: &RateLimitSettings) -> LimiterConfig {
    LimiterConfig {
        window: Duration::from_secs(settings.window_secs),
        max_requests: settings.max_requests,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.load_settings()?;

    init_subscriber(&settings.logging.level, settings.logging.format);

    let metrics = capgate_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    if settings.auth.secret().is_none() {
        tracing::error!(
            "no API key configured (auth.apiKey / CAPGATE_API_KEY); every transcript request will return 500"
        );
    }

    let fetch = fetch_config(&settings.fetch);
    tracing::info!(
        program = %fetch.program,
        language = %fetch.language,
        timeout_ms = settings.fetch.timeout_ms,
        work_dir = %fetch.work_dir.display(),
        "fetch executor configured"
    );
    let executor = Arc::new(FetchExecutor::with_tokio_runner(fetch));
    let limiter = Arc::new(AdmissionLimiter::new(limiter_config(&settings.rate_limit)));
    let pipeline = TranscriptPipeline::new(
        Authenticator::new(settings.auth.secret()),
        limiter.clone(),
        executor,
    );

    let config = ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
    };
    let server = GatewayServer::new(config, pipeline, metrics);

    let sweeper = limiter.spawn_sweeper(
        Duration::from_secs(settings.rate_limit.sweep_interval_secs),
        server.shutdown().token(),
    );

    let (addr, handle) = server
        .listen()
        .await
        .with_context(|| format!("Failed to bind {}", server.config().bind_addr()))?;

    tracing::info!(
        window_secs = settings.rate_limit.window_secs,
        max_requests = settings.rate_limit.max_requests,
        "capgate listening on http://{addr}"
    );

    shutdown_signal().await;

    tracing::info!("Shutting down...");
    let shutdown = server.shutdown();
    shutdown.track(handle);
    shutdown.track(sweeper);
    shutdown.graceful_shutdown(None).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
