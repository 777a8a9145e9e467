use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cache;
mod config;
mod error;
mod handlers;
mod models;
mod reaper;
mod service;
mod shortcode;
mod store;

use cache::LinkCache;
use reaper::Reaper;
use service::ShortenService;
use shortcode::CodeGenerator;
use store::SqliteStore;

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    pub config: config::AppConfig,
    pub service: ShortenService,
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (ignore error if file is absent, env vars may already be set)
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tinylink=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = config::AppConfig::from_env()?;
    tracing::info!("Starting tinylink on {}", config.bind_addr());

    // Open the durable store and rebuild the cache from it. Either failing
    // aborts startup.
    let store = Arc::new(SqliteStore::open(&config.database_url).await?);
    let cache = LinkCache::with_capacity(config.cache_capacity);
    store::warm_cache(store.as_ref(), &cache).await?;

    let reaper = match config.reaper() {
        Some(reaper_config) => Some(Reaper::start(cache.clone(), reaper_config)),
        None => {
            tracing::info!("Cache reaper disabled");
            None
        }
    };

    let service = ShortenService::new(store, cache, CodeGenerator::murmur3(config.hash_seed));
    let state = Arc::new(AppState { config, service });
    let app = build_router(state.clone());

    // ── Serve ──────────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(state.config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", state.config.bind_addr()))?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    let (drain_tx, drain_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                drain_rx.await.ok();
            })
            .await
    });

    tokio::select! {
        _ = shutdown_signal() => {}
        result = &mut server => {
            // The listener stopped on its own; nothing left to drain.
            match result {
                Ok(Ok(())) => tracing::warn!("Server exited unexpectedly"),
                Ok(Err(e)) => tracing::error!("Server error: {:?}", e),
                Err(e) => tracing::error!("Server task failed: {}", e),
            }
            shutdown(reaper, &state).await;
            return Ok(());
        }
    }

    tracing::info!("Shutting down, draining in-flight requests...");
    drain_tx.send(()).ok();
    drain(server, state.config.shutdown_timeout).await;
    shutdown(reaper, &state).await;

    tracing::info!("Server exiting");
    Ok(())
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Snapshot listing, or ?code= forwarding
        .route("/", get(handlers::redirect::index))
        .route("/health", get(|| async { axum::http::StatusCode::OK }))
        .route("/shorten", post(handlers::shorten::shorten))
        // Short-link redirect, must come LAST so fixed paths take priority
        .route("/:code", get(handlers::redirect::redirect))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new()),
        )
}

/// Wait for the server task to finish draining, aborting it once `timeout`
/// has passed.
async fn drain(
    mut server: tokio::task::JoinHandle<std::io::Result<()>>,
    timeout: Duration,
) {
    match tokio::time::timeout(timeout, &mut server).await {
        Ok(Ok(Ok(()))) => tracing::info!("All in-flight requests finished"),
        Ok(Ok(Err(e))) => tracing::error!("Server error during shutdown: {:?}", e),
        Ok(Err(e)) => tracing::error!("Server task failed: {}", e),
        Err(_) => {
            tracing::error!(
                "In-flight requests did not finish within {}s, forcing shutdown",
                timeout.as_secs()
            );
            server.abort();
        }
    }
}

async fn shutdown(reaper: Option<Reaper>, state: &AppState) {
    if let Some(reaper) = reaper {
        reaper.stop();
    }
    state.service.store().close().await;
    tracing::info!("Link store closed");
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
