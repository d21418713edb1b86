//! Convoy Server - Main entry point

use anyhow::Result;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use convoy_common::logging::{init_logging, LogConfig};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::info;

use convoy_server::{
    cache::{FingerprintCache, SqliteCacheStore},
    config::Config,
    conversion::{CallbackResolver, Credential, JobDispatcher, Materializer},
    features::{self, callback::MarkupStripper, FeatureState},
    middleware,
    remote::{HttpClientFactory, HttpFetcher},
    storage::{LocalArtifactStore, ServiceAccount},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Environment variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .log_file_prefix("convoy-server")
        .filter_directives("convoy_server=debug,tower_http=debug,axum=info")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting Convoy Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let cache = if config.cache.enabled {
        let store = SqliteCacheStore::open(&config.cache.path).await?;
        FingerprintCache::new(Arc::new(store))
    } else {
        info!("Persistent cache disabled, pending jobs will not survive a restart");
        FingerprintCache::in_memory()
    };

    tokio::fs::create_dir_all(&config.storage.root).await?;
    // Output paths are checked against the root by prefix
    let storage_root = tokio::fs::canonicalize(&config.storage.root).await?;
    let store = Arc::new(LocalArtifactStore::new(
        storage_root,
        &config.storage.public_url,
    ));
    info!("Artifact store rooted at {}", store.root().display());

    let materializer = Arc::new(Materializer::new(
        store.clone(),
        ServiceAccount::new(&config.storage.service_account),
    ));

    let conversion = &config.conversion;
    let request_timeout = Duration::from_secs(conversion.request_timeout_secs);
    let factory = Arc::new(HttpClientFactory::new(
        &conversion.api_url,
        request_timeout,
        Duration::from_millis(conversion.poll_interval_ms),
    ));
    let dispatcher = JobDispatcher::new(
        conversion,
        Credential::from_config(conversion),
        factory,
        cache.clone(),
        materializer.clone(),
    );

    let fetcher = Arc::new(HttpFetcher::new(&conversion.callback_scheme, request_timeout)?);
    let resolver = CallbackResolver::new(cache, fetcher, materializer)
        .forget_completed(conversion.forget_completed_jobs);

    info!("Callback endpoint: {}", conversion.callback_url());

    let state = FeatureState {
        dispatcher: Arc::new(dispatcher),
        resolver: Arc::new(resolver),
        store,
        stripper: MarkupStripper::new()?,
    };

    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Connect info feeds the loopback check on the trigger endpoint
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
    .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Create the application router with all routes and middleware
fn create_router(state: FeatureState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(features::router(state, &config.conversion.callback_path))
        .layer(middleware::tracing_layer())
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
