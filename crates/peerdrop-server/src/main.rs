//! # peerdrop-server
//!
//! Rendezvous relay for peerdrop. Peers exchange one session description
//! each through a room-keyed slot:
//! - `PUT /api/:room` stores a JSON document (the sender's offer, then the
//!   receiver's answer)
//! - `GET /api/:room` returns it as a JSON string
//!
//! Rooms expire a while after their last write. Requests are rate limited
//! per client IP. File bytes never pass through here.

mod api;
mod config;
mod error;
mod rate_limit;
mod store;

use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;

const RATE_LIMIT_PURGE_INTERVAL: Duration = Duration::from_secs(300);
const RATE_LIMIT_MAX_IDLE: Duration = Duration::from_secs(600);
const ROOM_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,peerdrop_server=debug")),
        )
        .init();

    info!("Starting peerdrop relay v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    let http_addr = config.http_addr;
    let state = AppState::new(config);

    let limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            limiter.purge_stale(RATE_LIMIT_MAX_IDLE).await;
        }
    });

    let store = state.store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ROOM_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            store.purge_expired().await;
        }
    });

    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
