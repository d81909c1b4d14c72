//! HTTP server: shared context, router and lifecycle.

pub mod error;
pub mod identity;
pub mod request_id;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::middleware;
use axum::routing::post;
use axum::Router;
use tokio::signal;
use tokio::sync::Semaphore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::downloader::tools::{binary_version, resolve_ytdlp_binary};
use crate::downloader::{build_extractor, Extractor, ExtractorMode, StreamRelay};
use request_id::request_id_middleware;

pub use error::ApiError;
pub use identity::CurrentUser;

/// State shared by all handlers. Immutable after startup.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub extractor: Arc<dyn Extractor>,
    pub relay: Arc<StreamRelay>,
    pub metadata_slots: Arc<Semaphore>,
}

impl AppContext {
    pub fn new(config: Config, extractor: Arc<dyn Extractor>) -> Self {
        let relay = StreamRelay::new(extractor.clone(), config.server.relay_settings());
        let metadata_slots = Semaphore::new(config.server.max_concurrent_metadata);

        Self {
            config: Arc::new(config),
            extractor,
            relay: Arc::new(relay),
            metadata_slots: Arc::new(metadata_slots),
        }
    }
}

/// Build the application router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/metadata", post(routes::metadata))
        .route("/download", post(routes::download))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Start the HTTP server and run until Ctrl+C / SIGTERM.
pub async fn serve(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let extractor = build_extractor(&config.extractor).context("Failed to set up extractor")?;
    log_extractor_version(&config, extractor.as_ref()).await;

    let ctx = AppContext::new(config, extractor);
    let app = build_router(ctx);

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn log_extractor_version(config: &Config, extractor: &dyn Extractor) {
    if config.extractor.mode == ExtractorMode::Remote {
        return;
    }
    let program = resolve_ytdlp_binary(config.extractor.ytdlp_path.as_deref());
    match binary_version(&program).await {
        Some(version) => tracing::info!(extractor = extractor.name(), %program, %version, "yt-dlp found"),
        None => tracing::warn!(
            extractor = extractor.name(),
            %program,
            "yt-dlp binary not found; requests fail unless the Python module is installed"
        ),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
