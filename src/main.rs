//! ircultrad - Ultra IRC gateway.
//!
//! A session-multiplexed, multi-channel chat gateway with a classical
//! line-oriented compatibility endpoint on the same socket.

use ircultrad::config::{Config, LogFormat};
use ircultrad::dispatch::Dispatcher;
use ircultrad::hub::Hub;
use ircultrad::network::Gateway;
use ircultrad::retention::spawn_retention_sweeper;
use ircultrad::security::RateLimitManager;
use ircultrad::store::Store;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().map_err(|e| {
        eprintln!("ERROR: Failed to load configuration: {e}");
        e
    })?;

    // Initialize tracing based on config
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .json()
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        }
    }

    if let Err(errors) = ircultrad::config::validate(&config) {
        for err in &errors {
            error!(error = %err, "Configuration validation failed");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    info!(
        addr = %config.bind_addr(),
        state = %config.state_path.display(),
        retention_days = config.retention_days,
        "Starting ircultrad"
    );

    let store = Store::open(&config.state_path, config.flush_interval).await?;

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(8);

    // Signal handler for graceful shutdown.
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};
            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "Failed to install SIGINT handler");
                    return;
                }
            };
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    return;
                }
            };

            tokio::select! {
                _ = sigint.recv() => info!("Received SIGINT - initiating graceful shutdown"),
                _ = sigterm.recv() => info!("Received SIGTERM - initiating graceful shutdown"),
            }
            let _ = shutdown_tx.send(());
        });
    }

    let flusher = store.spawn_flusher(shutdown_tx.subscribe());
    let sweeper = spawn_retention_sweeper(
        Arc::clone(&store),
        config.retention_days,
        shutdown_tx.subscribe(),
    );
    info!("Write-behind flusher and retention sweeper started");

    let hub = Arc::new(Hub::new());
    let limiter = Arc::new(RateLimitManager::new());
    let config = Arc::new(config);
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&store),
        hub,
        limiter,
        Arc::clone(&config),
    ));

    let gateway = Gateway::bind(&config.bind_addr(), dispatcher, shutdown_tx.clone()).await?;
    gateway.run().await?;

    info!("Gateway stopped, flushing state...");
    sweeper.abort();
    let _ = flusher.await;
    store.flush().await?;

    // Give in-flight session tasks a moment to close their sockets.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    info!("Shutdown complete");
    Ok(())
}
