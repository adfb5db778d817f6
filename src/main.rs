//! Tictac Game Server
//!
//! Binds the WebSocket listener with an in-memory store and JWT auth.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tictac::network::auth::{AuthConfig, JwtTokenProvider};
use tictac::{GameServer, MemorySessionStore, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tictac=info,tictac_server=info")),
        )
        .init();

    info!("Tictac Server v{}", VERSION);

    let auth_config = AuthConfig::from_env();
    if auth_config.skip_expiry {
        warn!("Token expiry checks disabled");
    }
    let auth = JwtTokenProvider::new(auth_config).context("AUTH_SECRET must be set")?;

    let config = ServerConfig::from_env();
    info!(
        "Limits: {} connections, {} byte messages, {} frame buffer",
        config.max_connections, config.max_message_size, config.outbound_buffer
    );

    let server = Arc::new(GameServer::new(config, Arc::new(auth), Arc::new(MemorySessionStore::new())));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            signal_server.shutdown();
        }
    });

    server.run().await.context("server failed")?;
    info!("Server stopped");
    Ok(())
}
