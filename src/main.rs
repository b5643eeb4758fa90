//! eventrelayd - real-time group messaging relay.
//!
//! Clients attach over WebSocket, receive channel and direct messages
//! published through the HTTP API, and one elected instance mirrors
//! selected channels to an external chat bridge.

mod bridge;
mod bus;
mod config;
mod election;
mod error;
mod http;
mod metrics;
mod network;
mod router;
mod state;
mod telemetry;

use crate::bridge::SlackBridge;
use crate::bus::LocalBus;
use crate::config::Config;
use crate::election::{LeaderElector, LocalLockService};
use crate::http::ApiState;
use crate::network::Gateway;
use crate::state::{ChannelTable, UserRegistry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = config::validation::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {}", errors.len(), config_path);
    }

    info!(
        server = %config.server.name,
        websocket = %config.listen.websocket,
        http = %config.listen.http,
        "Starting eventrelayd"
    );

    // Initialize Prometheus metrics
    metrics::init();
    if let Some(port) = config.server.metrics_port.filter(|p| *p != 0) {
        tokio::spawn(http::run_metrics_server(port));
    }

    // Core state
    let bus = Arc::new(LocalBus::new(config.limits.bus_queue));
    let registry = UserRegistry::new(bus.clone(), Arc::new(ChannelTable::new()));

    // Bridge and leadership election
    let bridge = Arc::new(SlackBridge::new(config.bridge.clone())?);
    let elector = LeaderElector::new(
        Arc::new(LocalLockService::new()),
        bus.clone(),
        bridge.clone(),
        config.election.lock_name.clone(),
        config.election.retry_interval(),
    );
    elector.activate().await;

    let shutdown = CancellationToken::new();

    // Refresh state gauges (runs every minute)
    {
        let registry = Arc::clone(&registry);
        let bus = Arc::clone(&bus);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }
                metrics::set_connected_users(registry.user_count());
                metrics::set_active_channels(registry.channels().len());
                tracing::debug!(
                    users = registry.user_count(),
                    channels = registry.channels().len(),
                    topics = bus.topic_count(),
                    "Relay state"
                );
            }
        });
    }

    // HTTP API
    let api_listener = TcpListener::bind(config.listen.http).await?;
    let api = http::api_router(ApiState::new(
        bus.clone(),
        config.api.key.clone(),
        Some(bridge),
    ));
    let http_task = tokio::spawn(http::serve(api_listener, api, shutdown.clone()));

    // WebSocket gateway
    let gateway = Gateway::bind(
        config.listen.websocket,
        config.listen.allow_origins.clone(),
        config.limits.connection_queue,
        Arc::clone(&registry),
    )
    .await?;
    let gateway_task = tokio::spawn(gateway.run(shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    shutdown.cancel();
    elector.shutdown();

    let (http_result, gateway_result) = tokio::join!(http_task, gateway_task);
    http_result?;
    gateway_result??;

    Ok(())
}
