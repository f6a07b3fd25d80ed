use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use depot_api::{build_limiter, build_router, spawn_pruner, AppState, ServerConfig};
use depot_catalog::{CachedCatalog, HttpCatalog};
use depot_core::defaults::RATE_LIMIT_PRUNE_SECS;
use depot_core::CatalogStore;
use depot_jobs::OperationTracker;
use depot_storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "depot_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "depot_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("depot-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = ServerConfig::from_env();

    let storage = Arc::new(Storage::open(&config.storage).await?);

    let upstream: Arc<dyn CatalogStore> = Arc::new(HttpCatalog::new(&config.catalog)?);
    let catalog: Arc<dyn CatalogStore> =
        Arc::new(CachedCatalog::new(upstream, config.catalog.cache_ttl));
    info!(url = %config.catalog.base_url, "Catalog client configured");

    let tracker = OperationTracker::new(storage.clone(), config.tracker.clone());

    let shutdown = CancellationToken::new();
    let limiter = build_limiter(&config.rate_limit)?;
    if let Some(limiter) = &limiter {
        info!(
            requests = config.rate_limit.requests,
            period_secs = config.rate_limit.period.as_secs(),
            "Rate limiting enabled"
        );
        spawn_pruner(
            limiter.clone(),
            Duration::from_secs(RATE_LIMIT_PRUNE_SECS),
            shutdown.clone(),
        );
    }

    let state = AppState::new(storage, catalog, tracker.clone()).with_rate_limiter(limiter);
    let app = build_router(state, config.max_upload_bytes);

    // Start server
    let addr: SocketAddr = config.bind_address().parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
    })
    .await?;

    shutdown.cancel();
    tracker.shutdown();
    Ok(())
}
