//! `BroadChat` relay server -- minimal real-time broadcast relay.
//!
//! An axum WebSocket server that fans every chat message out to all other
//! connected clients, tagging who sent it. Connections are identified as
//! `client-<n>` in accept order; join and leave events are announced to the
//! remaining clients.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:8080
//! cargo run --bin broadchat-relay
//!
//! # Run on custom address
//! cargo run --bin broadchat-relay -- --bind 127.0.0.1:9090
//!
//! # Or via environment variable
//! BROADCHAT_ADDR=127.0.0.1:9090 cargo run --bin broadchat-relay
//! ```

use std::sync::Arc;

use broadchat_relay::config::{RelayCliArgs, RelayConfig};
use broadchat_relay::relay::{self, RelayState};
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting broadchat relay server");

    let state = Arc::new(RelayState::new());

    match relay::start_server_with_state(&config.bind_addr, Arc::clone(&state)).await {
        Ok((bound_addr, mut handle)) => {
            tracing::info!(addr = %bound_addr, "relay server listening");
            tokio::select! {
                result = &mut handle => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "relay server task failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    // Stop accepting, close every live connection, exit.
                    // In-flight sends are best-effort.
                    tracing::info!("shutdown signal received, closing connections");
                    state.close_all_connections().await;
                    handle.abort();
                }
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            std::process::exit(1);
        }
    }
}
