//! Identity Cache - standalone cache node
//!
//! Boots the cache from environment configuration, runs its background
//! tasks and shuts down on SIGINT/SIGTERM.

use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use identity_cache::cache::CacheMetrics;
use identity_cache::{spawn_cleanup_task, spawn_metrics_reporter, CacheService, Config};

/// Main entry point for the cache node.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Initialize the process-wide metrics collector
/// 4. Create the cache service with the configured provider
/// 5. Start cleanup and metrics tasks
/// 6. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "identity_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting identity cache");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: provider={}, namespace={}, max_entries={}, cleanup_interval={}s",
        config.provider, config.namespace, config.max_entries, config.cleanup_interval
    );

    let metrics = CacheMetrics::global();
    info!("Metrics collector started at {}", metrics.summary().start_time);

    let cache = CacheService::from_config(&config)?;
    info!("Cache service initialized ({} provider)", cache.provider_kind());

    let handles = vec![
        spawn_cleanup_task(cache.clone(), config.cleanup_interval),
        spawn_metrics_reporter(cache.clone(), config.metrics_interval),
    ];
    info!("Background tasks started");

    shutdown_signal(handles).await;

    info!("Shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then aborts background tasks.
async fn shutdown_signal(handles: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    for handle in handles {
        handle.abort();
    }
    warn!("Background tasks aborted");
}
