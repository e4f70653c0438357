mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::cache::KnownPostCache;
use crate::config::Config;
use crate::queue::JobQueue;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub queue: JobQueue,
    pub cache: Arc<KnownPostCache>,
    /// Bearer token for `POST /jobs`; intake is disabled when unset.
    pub intake_token: Option<Arc<str>>,
}

impl AppState {
    #[must_use]
    pub fn new(queue: JobQueue, cache: Arc<KnownPostCache>, config: &Config) -> Self {
        Self {
            queue,
            cache,
            intake_token: config.intake_token.as_deref().map(Arc::from),
        }
    }
}

/// Start the web server and run it until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the address is invalid or the server fails to start.
pub async fn serve(config: &Config, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.web_host, config.web_port)
        .parse()
        .context("Invalid web server address")?;

    let app = create_app(state);

    info!(addr = %addr, "Starting HTTP web server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind web server")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Web server error")?;

    Ok(())
}

/// Create the main application router.
pub fn create_app(state: AppState) -> Router {
    let intake_enabled = state.intake_token.is_some();
    if !intake_enabled {
        warn!("INTAKE_TOKEN not set, POST /jobs is disabled");
    }

    Router::new()
        .merge(routes::router(intake_enabled))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
