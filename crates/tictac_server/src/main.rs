//! Tictac Server - CLI entry point.

#![warn(missing_docs)]

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tictac_server::{
    AppState, DeviceAuthRequest, DeviceFingerprint, IdentityIssuer, IdentityVerifier,
    LocalLeaderboards, LocalRegistry, ServerConfig, SessionDirectory, SystemClock,
    generate_device_auth, router,
};
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

/// Grace period handed to matches on shutdown.
const SHUTDOWN_GRACE_SECONDS: u32 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, host, port } => run_server(config, host, port).await,
        Command::Token {
            device_id,
            username,
            config,
        } => print_token(config, device_id, username),
    }
}

/// Run the match host behind the HTTP RPC surface
#[instrument(skip_all)]
async fn run_server(config: Option<PathBuf>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let config = ServerConfig::load(config.as_deref())?.with_bind(host, port);
    let secret = config.signing_secret()?;

    let registry = LocalRegistry::new(config.session_settings(), Arc::new(SystemClock));
    let directory = SessionDirectory::new(registry.clone(), *config.list_limit());
    let state = AppState::new(
        directory,
        IdentityIssuer::new(secret, *config.token_ttl_days()),
        IdentityVerifier::new(secret),
        LocalLeaderboards::new(),
    );
    let app = router(state);

    let listener = tokio::net::TcpListener::bind((config.host().as_str(), *config.port())).await?;
    info!(addr = %listener.local_addr()?, "Server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Shutdown requested");
        })
        .await?;

    registry.shutdown(SHUTDOWN_GRACE_SECONDS);
    info!("Server stopped");
    Ok(())
}

/// Issue a device token and print it
fn print_token(config: Option<PathBuf>, device_id: String, username: Option<String>) -> Result<()> {
    let config = ServerConfig::load(config.as_deref())?;
    let issuer = IdentityIssuer::new(config.signing_secret()?, *config.token_ttl_days());
    let request = DeviceAuthRequest {
        fingerprint: DeviceFingerprint::from_device_id(device_id),
        username,
    };
    let reply = generate_device_auth(&issuer, &serde_json::to_string(&request)?)?;
    println!("{}", reply);
    Ok(())
}
