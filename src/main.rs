//! Face Location Service
//!
//! Finds the single largest face in an uploaded image so clients can crop
//! headshots. Serves a small REST API (Axum) with per-client rate limiting.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use croppa::config::Config;
use croppa::engine::{FaceLocator, SeetaCascade};
use croppa::limiter::InMemoryRateLimiter;
use croppa::service::FaceService;
use croppa::api::rest::{AppState, create_rest_router};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Starting Face Location Service v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = Config::load_or_default(&Config::default_path())?;
    config.apply_env()?;
    config.validate()?;

    info!("Configuration loaded:");
    info!("  Listen: {}:{}", config.server.host, config.server.port);
    info!("  Max upload: {} bytes", config.upload.max_bytes);
    info!("  Trusted IP header: {:?}", config.server.trusted_ip_header);
    info!("  Model: {}", config.detection.model_path.display());

    // Load the cascade once; without it the service is useless
    let cascade = SeetaCascade::load(&config.detection.model_path, &config.detection)?;
    let locator = Arc::new(FaceLocator::from_config(Arc::new(cascade), &config.detection));

    let params = locator.params();
    info!(
        "  Detection: scale {} / neighbors {} / min size {} / {} concurrent",
        params.scale_factor, params.min_neighbors, params.min_face_size, config.detection.max_concurrent
    );

    let service = Arc::new(FaceService::from_config(locator, &config.detection));

    // Rate limiter and its sweep task
    let limiter = Arc::new(InMemoryRateLimiter::from_config(&config.rate_limit));
    info!("  Rate limit: {} requests / {:?}", limiter.limit(), limiter.window());
    let sweep_interval = Duration::from_secs(config.rate_limit.sweep_interval_secs);
    tokio::spawn(limiter.clone().start_sweep_task(sweep_interval));

    let app_state = Arc::new(AppState {
        service,
        limiter: limiter.clone(),
        service_name: config.server.service_name.clone(),
        trusted_ip_header: config.server.trusted_ip_header.clone(),
        max_upload_bytes: config.upload.max_bytes,
    });

    let rest_router = create_rest_router(app_state, &config.server.cors_origins);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Face Location Service is ready!");
    info!("REST API listening on http://{}", addr);

    axum::serve(
        listener,
        rest_router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("REST server failed")?;

    info!("Shutdown signal received, cleaning up...");
    limiter.shutdown();

    info!("Goodbye!");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
