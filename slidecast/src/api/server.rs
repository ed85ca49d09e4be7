//! API server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::routes;
use crate::error::{Error, Result};
use crate::exec::ExecutionStrategy;
use crate::progress::ProgressPublisher;
use crate::storage::AssetStore;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Request body size limit in bytes
    pub body_limit: usize,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8090,
            enable_cors: true,
            body_limit: 64 * 1024,
        }
    }
}

impl ApiServerConfig {
    /// Load API server config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `SLIDECAST_BIND_ADDRESS` (e.g. "0.0.0.0")
    /// - `SLIDECAST_PORT` (e.g. "8090")
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(bind_address) = std::env::var("SLIDECAST_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            config.bind_address = bind_address;
        }

        if let Ok(port) = std::env::var("SLIDECAST_PORT")
            && let Ok(parsed) = port.parse::<u16>()
        {
            config.port = parsed;
        }

        config
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    /// The configured execution strategy for accepted jobs
    pub executor: Arc<dyn ExecutionStrategy>,
    /// Progress store queried by the status and event endpoints
    pub progress: Arc<dyn ProgressPublisher>,
    /// Asset layout for session and artifact lookups
    pub assets: Arc<AssetStore>,
}

impl AppState {
    pub fn new(
        executor: Arc<dyn ExecutionStrategy>,
        progress: Arc<dyn ProgressPublisher>,
        assets: Arc<AssetStore>,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            executor,
            progress,
            assets,
        }
    }
}

/// The HTTP server wrapping the render service.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with all middleware and routes.
    fn build_router(&self) -> Router {
        let mut router = routes::create_router(self.state.clone())
            .layer(DefaultBodyLimit::max(self.config.body_limit));

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        // Health checks are polled frequently, keep them out of the traces.
        router.layer(TraceLayer::new_for_http().make_span_with(|req: &Request| {
            if req.uri().path().starts_with("/api/health") {
                Span::none()
            } else {
                let mut make_span =
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO);
                use tower_http::trace::MakeSpan;
                make_span.make_span(req)
            }
        }))
    }

    /// Start the server and serve until the cancellation token fires.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| Error::Other(format!("Invalid bind address: {}", e)))?;

        let router = self.build_router();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("API server listening on http://{}", addr);

        let cancel_token = self.cancel_token.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await
            .map_err(|e| Error::Other(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
