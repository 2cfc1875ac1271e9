//! API server setup and configuration.

use axum::Router;
use axum::extract::Request;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::routes;
use crate::api::status::StatusBoard;
use crate::config::{Options, keys};
use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use crate::track::TargetRegistry;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address to listen on
    pub listen_addr: SocketAddr,
    /// Enable CORS
    pub enable_cors: bool,
}

impl ApiServerConfig {
    pub fn from_options(options: &Options) -> Result<Self> {
        let raw = options.get(keys::LISTEN_ADDR);
        let listen_addr = raw
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| Error::config(format!("invalid listen_addr '{raw}': {e}")))?;
        Ok(Self {
            listen_addr,
            enable_cors: true,
        })
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    /// Root context passed to registry operations
    pub ctx: CancellationToken,
    pub registry: Arc<TargetRegistry>,
    pub board: Arc<StatusBoard>,
    /// Logging configuration for dynamic log level changes
    pub logging_config: Option<Arc<LoggingConfig>>,
}

impl AppState {
    pub fn new(ctx: CancellationToken, registry: Arc<TargetRegistry>) -> Self {
        let board = Arc::new(StatusBoard::new(Arc::clone(&registry)));
        Self {
            start_time: Instant::now(),
            ctx,
            registry,
            board,
            logging_config: None,
        }
    }

    /// Set the logging configuration.
    pub fn with_logging_config(mut self, config: Arc<LoggingConfig>) -> Self {
        self.logging_config = Some(config);
        self
    }
}

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Build the router with all middleware and routes.
    pub fn build_router(&self) -> Router {
        let mut router = routes::create_router(self.state.clone());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        router.layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    if req.uri().path().starts_with("/health") {
                        Span::none()
                    } else {
                        let mut make_span =
                            tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::DEBUG);
                        use tower_http::trace::MakeSpan;
                        make_span.make_span(req)
                    }
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        if span.is_disabled() {
                            return;
                        }
                        let on_response = tower_http::trace::DefaultOnResponse::new()
                            .level(tracing::Level::DEBUG);
                        use tower_http::trace::OnResponse;
                        on_response.on_response(res, latency, span);
                    },
                ),
        )
    }

    /// Serve until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let addr = self.config.listen_addr;
        let router = self.build_router();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Other(format!("cannot listen on {addr}: {e}")))?;

        tracing::info!("API server listening on http://{}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await
            .map_err(|e| Error::Other(format!("Server error: {}", e)))?;

        Ok(())
    }
}
