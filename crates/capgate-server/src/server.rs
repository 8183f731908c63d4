//! `GatewayServer`: the Axum HTTP server.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info};

use crate::config::ServerConfig;
use crate::errors::ErrorResponse;
use crate::handlers;
use crate::pipeline::TranscriptPipeline;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Request pipeline (secret, windows, executor).
    pub pipeline: Arc<TranscriptPipeline>,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The caption gateway server.
pub struct GatewayServer {
    config: ServerConfig,
    pipeline: Arc<TranscriptPipeline>,
    metrics: PrometheusHandle,
    shutdown: Arc<ShutdownCoordinator>,
}

impl GatewayServer {
    /// Create a new server.
    pub fn new(
        config: ServerConfig,
        pipeline: TranscriptPipeline,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            config,
            pipeline: Arc::new(pipeline),
            metrics,
            shutdown: Arc::new(ShutdownCoordinator::new()),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            pipeline: self.pipeline.clone(),
            metrics: self.metrics.clone(),
        };

        let cors = CorsLayer::new()
            .allow_origin(AnyOrigin)
            .allow_methods(AnyOrigin)
            .allow_headers(AnyOrigin);

        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO));

        Router::new()
            .route("/health", get(handlers::health_handler))
            .route("/metrics", get(handlers::metrics_handler))
            .route("/api/agent", get(handlers::agent_docs_handler))
            .route("/api/transcript", get(handlers::missing_video_id_handler))
            .route("/api/transcript/", get(handlers::missing_video_id_handler))
            .route("/api/transcript/{video_id}", get(handlers::transcript_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(trace_layer)
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(CatchPanicLayer::custom(panic_response))
                    .layer(cors),
            )
    }

    /// Bind the listener and serve until the shutdown token is cancelled.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%addr, "gateway listening");
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server error");
            }
            info!("gateway stopped");
        });
        Ok((addr, handle))
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the request pipeline.
    pub fn pipeline(&self) -> &Arc<TranscriptPipeline> {
        &self.pipeline
    }
}

fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    error!("handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Internal server error".into(),
        }),
    )
        .into_response()
}
