//! SSH server listener
//!
//! Accepts inbound client connections and runs a handler for each.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use russh_keys::key::KeyPair;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::handler::{GatewayHandler, ServerConfig};
use crate::state::GatewayState;

/// Public SSH endpoint of the gateway
pub struct GatewayServer {
    /// Server configuration
    config: ServerConfig,
    /// Shared gateway state
    state: Arc<GatewayState>,
    /// Cancellation token for graceful shutdown
    cancel: CancellationToken,
    /// Running session tasks
    sessions: TaskTracker,
}

impl GatewayServer {
    /// Create a new server
    pub fn new(host_key: KeyPair, state: Arc<GatewayState>, cancel: CancellationToken) -> Self {
        Self {
            config: ServerConfig::new(host_key),
            state,
            cancel,
            sessions: TaskTracker::new(),
        }
    }

    /// Accept connections on `bind_addr` until cancelled
    pub async fn run(&self, bind_addr: &str) -> Result<()> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", bind_addr))?;

        self.serve(listener).await
    }

    /// Accept connections on an already bound listener until cancelled.
    ///
    /// On shutdown, running sessions get `shutdown_timeout` to end their
    /// shells and publish their disconnects before this returns.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!("SSH gateway listening on {}", local_addr);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("SSH gateway shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr),
                        Err(e) => tracing::error!("Failed to accept connection: {}", e),
                    }
                }
            }
        }

        self.sessions.close();
        if !self.sessions.is_empty() {
            tracing::info!("Waiting for {} session(s) to finish", self.sessions.len());
        }

        let grace = self.state.config.shutdown_timeout;
        if tokio::time::timeout(grace, self.sessions.wait()).await.is_err() {
            tracing::warn!(
                "{} session(s) still running after {:?}, abandoning their tunnels",
                self.sessions.len(),
                grace
            );
        }

        Ok(())
    }

    fn handle_connection(&self, socket: tokio::net::TcpStream, peer_addr: SocketAddr) {
        tracing::info!("New connection from {}", peer_addr);

        let config = Arc::clone(&self.config.ssh_config);
        let handler = GatewayHandler::new(
            Arc::clone(&self.state),
            peer_addr,
            self.sessions.clone(),
            self.cancel.clone(),
        );
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let session = match russh::server::run_stream(config, socket, handler).await {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!("Handshake with {} failed: {}", peer_addr, e);
                    return;
                }
            };

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Connection handler cancelled for {}", peer_addr);
                    return;
                }
                result = session => result,
            };

            match result {
                Ok(()) => tracing::info!("Connection from {} closed normally", peer_addr),
                Err(e) => tracing::warn!("Connection from {} closed with error: {}", peer_addr, e),
            }
        });
    }
}

/// Load the host key, generating and saving a new Ed25519 key if missing
pub async fn load_or_generate_host_key(path: &Path) -> Result<KeyPair> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        tracing::info!("Loading host key from {:?}", path);
        let key = russh_keys::load_secret_key(path, None)
            .with_context(|| format!("Failed to load host key from {:?}", path))?;
        return Ok(key);
    }

    tracing::info!("Generating new host key at {:?}", path);

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let key = KeyPair::generate_ed25519()
        .ok_or_else(|| anyhow::anyhow!("Failed to generate Ed25519 key"))?;

    let mut pem = Vec::new();
    russh_keys::encode_pkcs8_pem(&key, &mut pem).context("Failed to encode host key")?;
    tokio::fs::write(path, &pem)
        .await
        .with_context(|| format!("Failed to write host key to {:?}", path))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .with_context(|| format!("Failed to restrict permissions on {:?}", path))?;
    }

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_host_key_generated_once_then_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("host_key");

        let generated = load_or_generate_host_key(&path).await.unwrap();
        assert!(path.exists());

        let loaded = load_or_generate_host_key(&path).await.unwrap();
        assert_eq!(
            generated.clone_public_key().unwrap().fingerprint(),
            loaded.clone_public_key().unwrap().fingerprint()
        );
    }
}
