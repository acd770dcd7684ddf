//! gatelink server
//!
//! Runs the connection hub and, when a gateway URL is configured, a bridge
//! that relays the gateway's chat, presence and agent events to hub
//! subscribers.
//!
//! Run with: cargo run --bin gatelink -- --config gatelink.toml

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use gatelink::chat::ChatStreamReducer;
use gatelink::config::Config;
use gatelink::gateway::GatewayClient;
use gatelink::server::{self, AppState};
use gatelink::websocket::ConnectionHub;
use gatelink::GatewayBridge;

#[derive(Parser)]
#[command(name = "gatelink")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time hub relaying an agent gateway to dashboard clients")]
struct Args {
    /// Config file (default: search the standard locations)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::load_default(),
    };

    gatelink::logging::init(&config.logging).context("initializing logging")?;

    tracing::info!("Starting gatelink v{}", env!("CARGO_PKG_VERSION"));

    let server_config = config.hub.server_config();
    let hub = Arc::new(ConnectionHub::new(config.hub.hub_config()));
    let mut state = AppState::with_hub(server_config.clone(), Arc::clone(&hub));

    // Bind before dialing the gateway so a port clash fails fast
    let listener = server::bind(&server_config).await?;

    let gateway = match config.gateway.client_config() {
        Some(gateway_config) => {
            let (client, events) = GatewayClient::with_channel(gateway_config);
            state = state.with_gateway_state(client.subscribe_state());

            let mut bridge =
                GatewayBridge::new(Arc::clone(&hub), ChatStreamReducer::new(config.chat.reducer_config()));
            if let Some(session_key) = &config.gateway.session_key {
                bridge = bridge.with_session_key(session_key.clone());
            }

            let bridge_task = tokio::spawn(bridge.run(events));
            client.start();
            Some((client, bridge_task))
        }
        None => {
            tracing::info!("No gateway configured, running hub only");
            None
        }
    };

    server::run(state, listener, server::shutdown_signal()).await?;

    if let Some((client, bridge_task)) = gateway {
        client.stop().await;
        // The bridge ends once the client's event sender is dropped
        drop(client);
        if let Err(e) = bridge_task.await {
            tracing::warn!(error = %e, "Gateway bridge ended abnormally");
        }
    }

    tracing::info!("gatelink shutdown complete");
    Ok(())
}
