use tracing::info;

/// Resolve when an interrupt or termination signal arrives.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(err) => {
            tracing::error!(error = %err, "failed to install SIGTERM handler");
            // Fall back to Ctrl+C only.
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        res = tokio::signal::ctrl_c() => {
            let _ = res;
            info!("SIGINT received");
        }
    }
}

#[cfg(not(unix))]
pub async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("interrupt received");
}
