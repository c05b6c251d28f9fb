//! russh-backed dialer and channel driver

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot};

use gw_core::config::{HostKeyPolicy, OutboundConfig};
use gw_core::error::OutboundError;
use gw_core::{DialTarget, ShellExit};

use super::shell::{RemoteShell, ShellCommand};
use super::{Dialer, OutboundConnection};

/// Read buffer for remote stdin
const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Capacity of the in-memory pipe between the driver and the bridge
const SHELL_PIPE_CAPACITY: usize = 64 * 1024;

/// Pending channel requests (pty, resizes, shell)
const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Whether `fingerprint` is acceptable under `policy`.
///
/// Pinned fingerprints may be written with or without the `SHA256:` prefix.
pub fn host_key_trusted(policy: HostKeyPolicy, trusted: &[String], fingerprint: &str) -> bool {
    match policy {
        HostKeyPolicy::AcceptAny => true,
        HostKeyPolicy::Pinned => trusted.iter().any(|pinned| {
            let pinned = pinned.trim();
            pinned.strip_prefix("SHA256:").unwrap_or(pinned) == fingerprint
        }),
    }
}

/// Dials tunnel endpoints with password authentication
pub struct SshDialer {
    ssh_config: Arc<client::Config>,
    policy: HostKeyPolicy,
    trusted: Arc<Vec<String>>,
    connect_timeout: Duration,
}

impl SshDialer {
    /// Create a dialer from the outbound configuration
    pub fn new(config: &OutboundConfig) -> Self {
        if config.host_key_policy == HostKeyPolicy::AcceptAny {
            tracing::warn!("Outbound host key verification is disabled (accept-any policy)");
        }

        Self {
            ssh_config: Arc::new(client::Config::default()),
            policy: config.host_key_policy,
            trusted: Arc::new(config.trusted_fingerprints.clone()),
            connect_timeout: config.connect_timeout,
        }
    }
}

#[async_trait]
impl Dialer for SshDialer {
    async fn dial(
        &self,
        target: &DialTarget,
        password: &str,
    ) -> Result<Box<dyn OutboundConnection>, OutboundError> {
        let handler = TunnelClientHandler {
            policy: self.policy,
            trusted: Arc::clone(&self.trusted),
        };

        tracing::debug!("Dialing {}", target);

        let dial = async {
            let mut handle = client::connect(Arc::clone(&self.ssh_config), target.address(), handler)
                .await
                .map_err(classify_connect_error)?;

            let authenticated = handle
                .authenticate_password(target.user.clone(), password)
                .await
                .map_err(|e| OutboundError::Connect(e.to_string()))?;

            if !authenticated {
                return Err(OutboundError::AuthenticationFailed(target.user.clone()));
            }

            Ok::<_, OutboundError>(handle)
        };

        let handle = tokio::time::timeout(self.connect_timeout, dial)
            .await
            .map_err(|_| OutboundError::Timeout(self.connect_timeout))??;

        tracing::info!("Authenticated to {}", target);

        Ok(Box::new(SshConnection {
            handle: Some(handle),
            target: target.to_string(),
        }))
    }
}

fn classify_connect_error(e: anyhow::Error) -> OutboundError {
    match e.downcast_ref::<russh::Error>() {
        Some(russh::Error::UnknownKey) => OutboundError::HostKeyRejected,
        _ => OutboundError::Connect(e.to_string()),
    }
}

/// An authenticated russh client connection
struct SshConnection {
    handle: Option<Handle<TunnelClientHandler>>,
    target: String,
}

#[async_trait]
impl OutboundConnection for SshConnection {
    async fn open_shell(&mut self) -> Result<RemoteShell, OutboundError> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| OutboundError::SessionOpen("connection already in use".into()))?;

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| OutboundError::SessionOpen(e.to_string()))?;

        tracing::debug!("Session channel {:?} open on {}", channel.id(), self.target);

        let (bridge_end, driver_end) = tokio::io::duplex(SHELL_PIPE_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (exit_tx, exit_rx) = oneshot::channel();

        let driver = ChannelDriver {
            handle,
            channel,
            local: driver_end,
            commands: command_rx,
            pending: VecDeque::new(),
            target: self.target.clone(),
        };
        tokio::spawn(driver.run(exit_tx));

        Ok(RemoteShell::new(bridge_end, command_tx, exit_rx))
    }
}

/// A channel request sent with want-reply, awaiting SUCCESS or FAILURE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingReply {
    Pty,
    Shell,
}

/// Owns the outbound channel and multiplexes it onto the local pipe
struct ChannelDriver {
    handle: Handle<TunnelClientHandler>,
    channel: Channel<Msg>,
    local: DuplexStream,
    commands: mpsc::Receiver<ShellCommand>,
    /// Replies arrive in request order
    pending: VecDeque<PendingReply>,
    target: String,
}

impl ChannelDriver {
    async fn run(mut self, exit_tx: oneshot::Sender<ShellExit>) {
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut exit = ShellExit::unknown();
        let mut stdin_open = true;
        let mut commands_open = true;

        loop {
            tokio::select! {
                msg = self.channel.wait() => match msg {
                    Some(ChannelMsg::Data { data }) => {
                        if let Err(e) = self.local.write_all(&data).await {
                            tracing::debug!("Dropping output from {}: {}", self.target, e);
                        }
                    }
                    Some(ChannelMsg::ExtendedData { data, .. }) => {
                        if let Err(e) = self.local.write_all(&data).await {
                            tracing::debug!("Dropping stderr from {}: {}", self.target, e);
                        }
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        tracing::debug!("Shell on {} exited with status {}", self.target, exit_status);
                        exit = ShellExit::with_status(exit_status);
                    }
                    Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                        tracing::debug!("Shell on {} killed by signal {:?}", self.target, signal_name);
                    }
                    Some(ChannelMsg::Success) => {
                        self.pending.pop_front();
                    }
                    Some(ChannelMsg::Failure) => {
                        let request = self.pending.pop_front();
                        tracing::warn!("{} refused {:?} request", self.target, request);
                        if request == Some(PendingReply::Shell) {
                            self.close_channel().await;
                            break;
                        }
                    }
                    Some(ChannelMsg::Eof) => {
                        tracing::debug!("EOF from {}", self.target);
                    }
                    Some(ChannelMsg::Close) | None => break,
                    Some(_) => {}
                },

                read = self.local.read(&mut buf), if stdin_open => match read {
                    Ok(0) => {
                        stdin_open = false;
                        if let Err(e) = self.channel.eof().await {
                            tracing::debug!("Failed to send EOF to {}: {}", self.target, e);
                        }
                    }
                    Ok(n) => {
                        if let Err(e) = self.channel.data(&buf[..n]).await {
                            tracing::warn!("Failed to write to {}: {}", self.target, e);
                            stdin_open = false;
                        }
                    }
                    Err(e) => {
                        tracing::debug!("Local input for {} closed: {}", self.target, e);
                        stdin_open = false;
                    }
                },

                command = self.commands.recv(), if commands_open => match command {
                    Some(command) => {
                        if !self.apply(command).await {
                            break;
                        }
                    }
                    None => commands_open = false,
                },
            }
        }

        // Output is fully written into the pipe; closing it lets the bridge
        // drain and finish before it learns the exit status.
        let ChannelDriver {
            handle,
            local,
            target,
            ..
        } = self;
        drop(local);

        let _ = exit_tx.send(exit);

        if let Err(e) = handle
            .disconnect(Disconnect::ByApplication, "session closed", "en")
            .await
        {
            tracing::debug!("Disconnect from {} failed: {}", target, e);
        }
    }

    /// Apply one queued request; false once the channel is finished
    async fn apply(&mut self, command: ShellCommand) -> bool {
        let result = match &command {
            ShellCommand::RequestPty(pty) => {
                let sent = self
                    .channel
                    .request_pty(
                        true,
                        &pty.term,
                        pty.size.width,
                        pty.size.height,
                        0,
                        0,
                        &[],
                    )
                    .await;
                if sent.is_ok() {
                    self.pending.push_back(PendingReply::Pty);
                }
                sent
            }
            ShellCommand::WindowChange(size) => {
                self.channel.window_change(size.width, size.height, 0, 0).await
            }
            ShellCommand::Shell => {
                let sent = self.channel.request_shell(true).await;
                if sent.is_ok() {
                    self.pending.push_back(PendingReply::Shell);
                }
                sent
            }
            ShellCommand::Close => {
                tracing::debug!("Closing channel to {}", self.target);
                self.close_channel().await;
                return false;
            }
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("{:?} on {} failed: {}", command, self.target, e);
                // Without a shell there is nothing left to wait for
                if command == ShellCommand::Shell {
                    self.close_channel().await;
                    return false;
                }
                true
            }
        }
    }

    async fn close_channel(&mut self) {
        if let Err(e) = self.channel.close().await {
            tracing::debug!("Failed to close channel to {}: {}", self.target, e);
        }
    }
}

/// russh client handler enforcing the host-key policy
struct TunnelClientHandler {
    policy: HostKeyPolicy,
    trusted: Arc<Vec<String>>,
}

#[async_trait]
impl client::Handler for TunnelClientHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        let trusted = host_key_trusted(self.policy, &self.trusted, &fingerprint);

        if trusted {
            tracing::debug!("Accepted tunnel host key SHA256:{}", fingerprint);
        } else {
            tracing::warn!("Rejected tunnel host key SHA256:{} (not pinned)", fingerprint);
        }

        Ok(trusted)
    }
}
