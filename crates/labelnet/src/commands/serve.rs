//! Serve command - runs the HTTP API until interrupted.

use anyhow::{Context, Result};
use config::Config;
use tokio::net::TcpListener;
use tracing::info;

use crate::api::{AppState, router};

/// Runs the serve command.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run(config: &Config, port: u16) -> Result<()> {
    let app = router(AppState::new(config), config.max_upload_bytes);

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    info!(port, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
