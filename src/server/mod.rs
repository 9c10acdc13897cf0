//! HTTP surface: `POST /api/generate` and `POST /api/transcribe`.

pub mod generate;
pub mod response;
pub mod transcribe;

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::upstream::Fetcher;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub fetcher: Fetcher,
}

impl AppState {
    /// Build state with a fetcher using the configured attempt timeout.
    pub fn new(config: Config) -> Result<Self> {
        let fetcher = Fetcher::new(config.upstream.attempt_timeout())?;
        Ok(Self::with_fetcher(config, fetcher))
    }

    pub fn with_fetcher(config: Config, fetcher: Fetcher) -> Self {
        Self {
            config: Arc::new(config),
            fetcher,
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.server.max_upload_bytes;
    Router::new()
        .route("/api/generate", post(generate::generate))
        .route("/api/transcribe", post(transcribe::transcribe))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve_on<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "Relay listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!(%addr, "Relay stopped");
    Ok(())
}

/// Bind `config.server.bind` and serve until `shutdown` resolves.
pub async fn serve<F>(config: Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind = config.server.bind.clone();
    let listener = TcpListener::bind(&bind).await.map_err(|e| {
        RelayError::Other(format!("Failed to bind {bind}: {e}"))
    })?;
    let state = AppState::new(config)?;
    serve_on(listener, state, shutdown).await
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
