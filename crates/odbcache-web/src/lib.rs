//! odbcache-web - Dev-server routes for odbcache using Axum

pub mod error;
pub mod router;
pub mod sse;

pub use error::ApiError;
pub use router::{create_router, normalize_prefix, AppState, WebConfig};

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

/// Run the web server until Ctrl-C
pub async fn run(state: AppState, config: WebConfig, port: u16) -> Result<()> {
    let router = create_router(state, &config)?;

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(%addr, prefix = %config.metadata_prefix, "Dev server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Web server failed")?;

    info!("Dev server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
