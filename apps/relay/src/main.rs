use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use localhosted_relay::{routes, AppState, Registry, RelayConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "localhosted_relay=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(RelayConfig::from_env());
    info!(
        port = config.port,
        domain = %config.domain,
        env = %config.env,
        "LocalHosted relay starting"
    );

    let registry = Arc::new(Registry::new());
    let state = AppState {
        registry: Arc::clone(&registry),
        config: Arc::clone(&config),
        started_at: Instant::now(),
    };

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(address = %listener.local_addr()?, "Listening for connections");

    axum::serve(listener, routes::app(state))
        .with_graceful_shutdown(shutdown_signal(registry))
        .await?;

    info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C, then close every tunnel before the server drains.
/// In-flight public requests fail with a disconnection error and return 502.
async fn shutdown_signal(registry: Arc<Registry>) {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Shutdown signal received, closing tunnels");
    registry.shutdown().await;
}
