//! REMS entitlement revoker
//!
//! Listens for REMS event notifications and revokes the remaining active
//! entitlements of denylisted or revoked users.

use std::sync::Arc;

use anyhow::{Context, Result};
use rems_revoker::{api, config::Config, EventRouter, RemsClient};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to REVOKER_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting REMS entitlement revoker");
    info!(
        listen_host = %config.listen_host,
        listen_port = config.listen_port,
        rems_url = %config.rems_url,
        policy = %config.policy,
        event_types = ?config.event_kinds.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "Configuration loaded"
    );

    let client = RemsClient::new(&config)?;
    let router = EventRouter::from_config(Arc::new(client), &config);
    let app = api::create_router(router);

    let listener = tokio::net::TcpListener::bind((config.listen_host.as_str(), config.listen_port))
        .await
        .with_context(|| {
            format!("Failed to bind {}:{}", config.listen_host, config.listen_port)
        })?;
    let addr = listener.local_addr().context("Failed to read bound address")?;
    info!(addr = %addr, "Event listener ready. Stop with Ctrl-C");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Received shutdown signal");
        })
        .await;

    match &result {
        Ok(()) => info!("Event listener stopped"),
        Err(e) => error!(error = %e, "Server error"),
    }
    result.context("HTTP server failed")
}
