use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pixcontrol::{BroadcastHub, EngineClient, EngineMirror, Poller, PollerSettings, SnapshotStore};

mod config;
mod routes;

use config::BridgeConfig;
use routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = BridgeConfig::from_env()?;
    info!(
        "Engine endpoint: {}:{}",
        config.engine_host, config.engine_port
    );

    let client = EngineClient::new(config.engine_host.clone(), config.engine_port);
    let store = Arc::new(SnapshotStore::new());
    let mirror = EngineMirror::new(client, store);
    let hub = Arc::new(BroadcastHub::new());
    let poller = Poller::new(mirror, Arc::clone(&hub), PollerSettings::default());

    // Populate the snapshot before any viewer can connect. The loop
    // starts parked; polling begins on the first enable request.
    info!("Running initial engine fetch...");
    poller.mirror().refresh_all().await;
    poller.start().await;

    let app = routes::router(AppState {
        poller,
        hub,
    });

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Bridge listening on {}", config.listen_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
