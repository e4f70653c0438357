use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use devtracker_ingest::api::{ApiClient, PostStore};
use devtracker_ingest::cache::{run_refresh_loop, KnownPostCache};
use devtracker_ingest::config::Config;
use devtracker_ingest::ingest::Ingestor;
use devtracker_ingest::queue::{JobQueue, QueueWorker};
use devtracker_ingest::reddit::RedditClient;
use devtracker_ingest::web::{self, AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting devtracker-ingest");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let queue_path = config
        .queue_database_path
        .clone()
        .context("QUEUE_DATABASE_PATH is not set; ingestion is disabled")?;

    info!(
        queue = %queue_path.display(),
        api = %config.api_base_url,
        max_per_window = config.queue_max_per_window,
        window_ms = config.queue_window.as_millis() as u64,
        "Configuration loaded"
    );

    if let Some(parent) = queue_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create queue directory: {}", parent.display())
        })?;
    }

    let queue = JobQueue::open(&queue_path, config.retry_policy())
        .await
        .context("Failed to open job queue")?;

    // Jobs left active by an interrupted run get another go.
    match queue.recover_stalled().await {
        Ok(0) => {}
        Ok(count) => info!(count, "Recovered stalled jobs"),
        Err(e) => error!("Failed to recover stalled jobs: {e:#}"),
    }

    let reddit = RedditClient::from_config(&config).context("Failed to build Reddit client")?;
    let api: Arc<dyn PostStore> =
        Arc::new(ApiClient::from_config(&config).context("Failed to build API client")?);
    let cache = Arc::new(KnownPostCache::new());

    let shutdown = CancellationToken::new();

    let refresh_handle = tokio::spawn(run_refresh_loop(
        Arc::clone(&cache),
        Arc::clone(&api),
        config.known_posts_refresh,
        shutdown.clone(),
    ));

    let ingestor = Ingestor::new(Arc::new(reddit), Arc::clone(&api), Arc::clone(&cache));
    let worker = QueueWorker::from_config(queue.clone(), &config);
    let worker_shutdown = shutdown.clone();
    let worker_handle = tokio::spawn(async move {
        worker.process(&ingestor, worker_shutdown).await;
    });

    let web_config = config.clone();
    let web_state = AppState::new(queue, Arc::clone(&cache), &config);
    let web_shutdown = shutdown.clone();
    let web_handle = tokio::spawn(async move {
        if let Err(e) = web::serve(&web_config, web_state, web_shutdown).await {
            error!("Web server error: {e:#}");
        }
    });

    shutdown_signal().await;

    info!("Shutting down...");
    shutdown.cancel();

    // The worker finishes its current job before returning.
    for (name, handle) in [
        ("worker", worker_handle),
        ("web", web_handle),
        ("cache refresh", refresh_handle),
    ] {
        if let Err(e) = handle.await {
            error!(task = name, "Task ended abnormally: {e}");
        }
    }

    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,devtracker_ingest=debug"));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
