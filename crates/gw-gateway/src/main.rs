//! SSH gateway daemon
//!
//! Accepts `user@device` logins on a public SSH endpoint and relays each
//! one to the device through a tunnel its agent opens on request.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gw_core::config::{self, GatewayConfig};
use ssh_gateway::control::MqttControl;
use ssh_gateway::server::{load_or_generate_host_key, GatewayServer};
use ssh_gateway::tunnel::local_port_range;
use ssh_gateway::GatewayState;

#[derive(Parser)]
#[command(name = "ssh-gateway")]
#[command(about = "SSH gateway relaying user@device logins through agent tunnels")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "SSH_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// MQTT broker as host:port (overrides config)
    #[arg(long)]
    broker: Option<String>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("SSH gateway starting...");

    let mut config = load_gateway_config(args.config.as_ref())?;

    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(broker) = &args.broker {
        let (host, port) = parse_broker(broker)?;
        config.broker.host = host;
        config.broker.port = port;
    }

    match local_port_range() {
        Some((start, end)) => tracing::info!("Tunnel ports come from {}-{}", start, end),
        None => tracing::debug!("Ephemeral port range not available"),
    }

    let host_key = load_or_generate_host_key(&config.host_key_path).await?;
    let public_key = host_key
        .clone_public_key()
        .context("Failed to derive host public key")?;
    tracing::info!("Host key fingerprint: SHA256:{}", public_key.fingerprint());

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Setup signal handlers
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    // Control plane: one client for the whole process. It outlives the
    // server so sessions ending during shutdown still publish disconnect.
    let (control, event_loop) = MqttControl::new(&config.broker);
    let (connected_tx, mut connected_rx) = watch::channel(false);
    let control_cancel = CancellationToken::new();
    let mut event_loop_task = tokio::spawn(event_loop.run(connected_tx, control_cancel.clone()));

    tracing::info!("Waiting for broker at {}", config.broker.address());
    tokio::select! {
        _ = cancel.cancelled() => {
            control_cancel.cancel();
            event_loop_task.await.ok();
            tracing::info!("Shutdown before the broker connected");
            return Ok(());
        }
        result = connected_rx.wait_for(|connected| *connected) => {
            result.context("Broker event loop stopped before connecting")?;
        }
    }

    let bind_addr = config.bind_address.clone();
    let flush_timeout = config.broker.publish_timeout;
    let state = Arc::new(GatewayState::new(config, Arc::new(control.clone())));

    let server = GatewayServer::new(host_key, state, cancel.clone());
    tracing::info!("Starting SSH server on {}", bind_addr);
    let result = server.run(&bind_addr).await;

    control.shutdown().await;
    if tokio::time::timeout(flush_timeout, &mut event_loop_task)
        .await
        .is_err()
    {
        tracing::warn!("Broker disconnect not confirmed within {:?}", flush_timeout);
        control_cancel.cancel();
        event_loop_task.await.ok();
    }

    result?;
    tracing::info!("SSH gateway shutdown complete");
    Ok(())
}

/// Load the config file, falling back to defaults when none exists
fn load_gateway_config(path: Option<&PathBuf>) -> Result<GatewayConfig> {
    if let Some(config_path) = path {
        return config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path));
    }

    let default_path = config::default_config_path();
    if default_path.exists() {
        Ok(config::load_config(&default_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
            GatewayConfig::default()
        }))
    } else {
        tracing::info!("Using default configuration");
        Ok(GatewayConfig::default())
    }
}

/// Split a `host:port` broker override
fn parse_broker(s: &str) -> Result<(String, u16)> {
    let (host, port) = s
        .rsplit_once(':')
        .with_context(|| format!("Broker must be host:port, got {:?}", s))?;
    let port = port
        .parse()
        .with_context(|| format!("Invalid broker port in {:?}", s))?;
    Ok((host.to_string(), port))
}
