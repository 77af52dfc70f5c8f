//! Binary entrypoint: loads config, sets up logging, builds Axum app, and serves the send endpoint.

use std::{net::SocketAddr, sync::Arc};

use dotenvy::dotenv;
use tracing::{debug, info};

use mailgate::config::{ServerConfig, Settings};
use mailgate::email::EmailState;
use mailgate::logger::set_logger;
use mailgate::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Load environment (.env is optional)
    dotenv().ok();
    let server = ServerConfig::from_env()?;

    // 2) Settings file; any problem here is fatal before we bind
    let settings = Settings::load(&server.config_path)?;

    // 3) Logging: optional compact console + append-only line file
    set_logger(&settings)?;
    debug!("Settings loaded from {}", server.config_path.display());

    // 4) Build app state (transport + sender identity) from settings
    let email = EmailState::from_settings(&settings)?;
    let state = Arc::new(AppState { settings, email });

    // 5) Router + bind address
    let app = routes::router(state);
    let addr: SocketAddr = format!("{}:{}", server.listen_addr, server.listen_port).parse()?;

    info!("Starting server on {addr}");

    // 6) Serve
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
