//! `asya-gateway` — the envelope store, stream, and MCP tool surface.
//!
//! Boots the Postgres-backed envelope store, connects the configured
//! transport, spawns the terminal-queue result consumers, and serves the
//! HTTP surface described in `crate::router`.

use std::sync::Arc;

use asya_gateway::result_consumer::spawn_result_consumers;
use asya_gateway::router::build_router;
use asya_gateway::{AppState, GatewayConfig, ToolCatalog};
use asya_store::{init_pg_pool, EnvelopeStore, PgBackend};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Runs the envelope store, stream, and MCP tool gateway.
#[derive(Parser, Debug)]
#[command(name = "asya-gateway", version, about)]
struct Cli {
    /// Load configuration from a `.env` file in the working directory
    /// before falling back to the process environment.
    #[arg(long, env = "ASYA_GATEWAY_DOTENV", default_value_t = true)]
    dotenv: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if cli.dotenv {
        asya_core::config::load_dotenv();
    }

    let config = GatewayConfig::from_env();
    config.core.log_summary();

    let pool = init_pg_pool(&config.core.postgres).await?;
    let store = EnvelopeStore::new(Arc::new(PgBackend::new(pool)));

    let transport = asya_transport::connect(&config.core.transport).await?;
    let catalog = ToolCatalog::from_env();

    let host = config.core.server.host.clone();
    let port = config.core.server.port;
    let shutdown = CancellationToken::new();
    let state = AppState::new(store, transport, config, catalog, shutdown.clone());

    spawn_result_consumers(state.clone());

    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "asya-gateway listening");

    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        shutdown.cancel();
    });
    if let Err(err) = serve.await {
        error!(error = %err, "server exited with error");
    }

    Ok(())
}

/// Waits for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for ctrl_c");
    }
}
