//! Gateway binary: configuration, tracing, listener, graceful shutdown.

use hyprcat_gateway::{router, AppState, Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    if config.enable_logging {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,hyprcat_gateway=debug")),
            )
            .init();
    }

    let state = AppState::new(config)?;
    let _sweeper = state.spawn_sweeper();

    let listener = tokio::net::TcpListener::bind(state.config.bind_addr()).await?;
    info!(
        addr = %listener.local_addr()?,
        base_url = %state.config.base_url,
        "hyprcat gateway listening"
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
