//! russh server handler for inbound clients
//!
//! Every authentication attempt is accepted: the login name is the only
//! thing the gateway needs from the client, and the real credential check
//! happens on the device once the password has been relayed.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::server::{Auth, Handler, Msg, Session};
use russh::{Channel, ChannelId, Pty};
use russh_keys::key::{KeyPair, PublicKey};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use gw_core::{PtyRequest, WindowSize};

use super::channel::InboundChannel;
use crate::state::GatewayState;

/// Handler for one inbound SSH connection
pub struct GatewayHandler {
    state: Arc<GatewayState>,
    peer_addr: SocketAddr,
    /// Login name from the accepted authentication attempt
    user: Option<String>,
    channels: HashMap<ChannelId, InboundChannel>,
    /// Session tasks, awaited on shutdown
    sessions: TaskTracker,
    shutdown: CancellationToken,
}

impl GatewayHandler {
    /// Create a handler for a connection from `peer_addr`
    pub fn new(
        state: Arc<GatewayState>,
        peer_addr: SocketAddr,
        sessions: TaskTracker,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            state,
            peer_addr,
            user: None,
            channels: HashMap::new(),
            sessions,
            shutdown,
        }
    }

    fn accept(&mut self, user: &str, method: &str) -> Auth {
        tracing::info!("{} authenticated as {:?} ({})", self.peer_addr, user, method);
        self.user = Some(user.to_string());
        Auth::Accept
    }

    /// Start the session on `channel` and acknowledge the request.
    ///
    /// Unknown channels and channels already running a session get a
    /// failure reply.
    fn start_session(&mut self, channel: ChannelId, session: &mut Session) {
        let user = self.user.clone().unwrap_or_default();
        let state = Arc::clone(&self.state);

        let started = match self.channels.get_mut(&channel) {
            Some(inbound) => inbound.start(
                user,
                state,
                session.handle(),
                &self.sessions,
                self.shutdown.clone(),
            ),
            None => {
                tracing::warn!("Session request on unknown channel {:?}", channel);
                false
            }
        };

        if started {
            tracing::debug!("Session started on {:?} from {}", channel, self.peer_addr);
            let _ = session.channel_success(channel);
        } else {
            tracing::debug!("Refusing session request on {:?}", channel);
            let _ = session.channel_failure(channel);
        }
    }
}

#[async_trait]
impl Handler for GatewayHandler {
    type Error = anyhow::Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        Ok(self.accept(user, "none"))
    }

    async fn auth_password(&mut self, user: &str, _password: &str) -> Result<Auth, Self::Error> {
        Ok(self.accept(user, "password"))
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        _public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(self.accept(user, "publickey"))
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let id = channel.id();
        tracing::debug!("Channel opened: {:?}", id);

        self.channels.insert(id, InboundChannel::new(id));
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let pty = PtyRequest::new(term, WindowSize::new(row_height, col_width));
        tracing::debug!("PTY request on {:?}: {} {}", channel, pty.term, pty.size);

        match self.channels.get_mut(&channel) {
            Some(inbound) => {
                inbound.set_pty(pty);
                let _ = session.channel_success(channel);
            }
            None => {
                let _ = session.channel_failure(channel);
            }
        }
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(inbound) = self.channels.get_mut(&channel) {
            inbound.resize(WindowSize::new(row_height, col_width));
        }
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.start_session(channel, session);
        Ok(())
    }

    /// Commands are not run; with a PTY the client gets the interactive
    /// shell, without one the session is refused like a bare shell request.
    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!(
            "Ignoring exec command {:?} on {:?}",
            String::from_utf8_lossy(data),
            channel
        );
        self.start_session(channel, session);
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::trace!("Received {} bytes on channel {:?}", data.len(), channel);

        if let Some(inbound) = self.channels.get(&channel) {
            inbound.push_input(data).await;
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("EOF on channel {:?}", channel);

        if let Some(inbound) = self.channels.get_mut(&channel) {
            inbound.close_input();
        }
        Ok(())
    }

    /// The session task keeps running until the remote shell exits, so the
    /// tunnel is still released after an early close.
    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("Channel closed: {:?}", channel);
        self.channels.remove(&channel);
        Ok(())
    }
}

/// Wrapper around the russh server configuration
pub struct ServerConfig {
    /// russh server configuration
    pub ssh_config: Arc<russh::server::Config>,
}

impl ServerConfig {
    /// Create a new server configuration with the given host key
    pub fn new(host_key: KeyPair) -> Self {
        let mut config = russh::server::Config::default();
        config.keys.push(host_key);
        config.auth_rejection_time = Duration::from_secs(1);
        config.auth_rejection_time_initial = Some(Duration::from_secs(0));

        Self {
            ssh_config: Arc::new(config),
        }
    }
}
