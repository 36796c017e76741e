use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use frapp8s::{cli::Cli, config::Config, logging, metrics::Metrics, server, signals};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Resolution and validation happen strictly before anything concurrent
    // starts; any failure here terminates with the full defect list.
    let cfg = Config::load(&args.config)
        .with_context(|| format!("failed to load config '{}'", args.config.display()))?;

    logging::init(&cfg.exporter_logging)?;

    if !args.config.exists() {
        warn!(
            path = %args.config.display(),
            "config file not found, using defaults and environment overrides"
        );
    }

    info!("effective configuration loaded");
    match cfg.to_formatted_json() {
        Ok(json) => debug!(config = %json, "loaded configuration"),
        Err(err) => warn!(error = %err, "could not render config for debugging"),
    }

    let metrics = Arc::new(Metrics::new().context("failed to build metrics registry")?);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let server_handle = tokio::spawn({
        let metrics = Arc::clone(&metrics);
        let listen_address = cfg.prometheus.listen_address.clone();
        let metrics_path = cfg.prometheus.metrics_path.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        async move { server::serve(metrics, &listen_address, &metrics_path, shutdown_rx).await }
    });

    info!("frapp8s is running, press Ctrl+C to exit");
    signals::shutdown_signal().await;

    info!("shutting down frapp8s exporter");
    let _ = shutdown_tx.send(());
    let _ = server_handle.await;

    Ok(())
}
