//! `asya-router` — the per-actor sidecar binary.
//!
//! One process per actor: reads `ACTOR_NAME`'s queue, drives the actor's
//! handler over a Unix socket, and routes the classified response to the
//! next hop. See [`asya_router::pump`] for the message loop itself.

use std::sync::Arc;

use asya_router::{Pump, RouterConfig};
use asya_runtime::RuntimeClient;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Runs the envelope router sidecar for a single actor.
#[derive(Parser, Debug)]
#[command(name = "asya-router", version, about)]
struct Cli {
    /// Load configuration from a `.env` file in the working directory
    /// before falling back to the process environment.
    #[arg(long, env = "ASYA_ROUTER_DOTENV", default_value_t = true)]
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

    let config = RouterConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    info!(actor = %config.actor_name, is_end_actor = config.is_end_actor, backend = %config.transport.backend, "starting asya-router");

    let transport = asya_transport::connect(&config.transport).await?;
    let runtime = RuntimeClient::new(config.socket_path(), config.runtime_timeout);
    let shutdown = CancellationToken::new();
    let pump = Arc::new(Pump::new(&config, transport, runtime, shutdown.clone()));

    let pump_for_signal = pump.clone();
    let run_handle = tokio::spawn(async move { pump_for_signal.run().await });

    tokio::select! {
        result = run_handle => {
            if let Err(err) = result {
                error!(error = %err, "pump task panicked");
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received, exiting");
            shutdown.cancel();
        }
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
