//! Per-session flow
//!
//! One inbound session, start to end: parse the target, lease a tunnel
//! port, signal the agent, collect the password, dial through the tunnel
//! and bridge the shell. The disconnect signal goes out once the shell has
//! exited; sessions that never reach the shell do not send one.

mod bridge;
mod credential;

pub use bridge::run_bridge;
pub use credential::{prompt_password, read_password, PASSWORD_PROMPT};

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use gw_core::{DialTarget, PtyRequest, ShellExit, TargetIdentity, WindowSize};
use gw_protocol::TunnelLease;

use crate::state::GatewayState;

/// Sent when the login name carries no device id
pub const INVALID_TARGET_MESSAGE: &str = "Invalid target session: device id is missing\n";

/// Sent to sessions that did not request a PTY
pub const PTY_REQUIRED_MESSAGE: &str =
    "PTY required: this gateway only supports interactive sessions\n";

/// Exit status reported to the client when the session never ran a shell
const FAILURE_EXIT_STATUS: u32 = 255;

/// An inbound client session, as seen by the session flow
pub struct InboundSession<S> {
    /// Composite `user@device[:port]` login name
    pub user: String,
    /// Client stdin (reads) and stdout (writes)
    pub stream: S,
    /// PTY requested before the shell, if any
    pub pty: Option<PtyRequest>,
    /// Window changes received after the PTY request
    pub resizes: mpsc::Receiver<WindowSize>,
}

/// How an inbound session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Login name had no device id
    InvalidTarget,
    /// Client did not request a PTY
    PtyRequired,
    /// No local port could be allocated
    PortAllocationFailed,
    /// Outbound connect or authentication failed
    DialFailed,
    /// Outbound session channel could not be opened
    SessionOpenFailed,
    /// Remote shell ran and exited
    Completed(ShellExit),
}

impl SessionOutcome {
    /// Exit status to report back to the inbound client, if any
    pub fn exit_status(&self) -> Option<u32> {
        match self {
            SessionOutcome::Completed(exit) => exit.status,
            _ => Some(FAILURE_EXIT_STATUS),
        }
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::InvalidTarget => write!(f, "invalid target"),
            SessionOutcome::PtyRequired => write!(f, "pty required"),
            SessionOutcome::PortAllocationFailed => write!(f, "port allocation failed"),
            SessionOutcome::DialFailed => write!(f, "dial failed"),
            SessionOutcome::SessionOpenFailed => write!(f, "session open failed"),
            SessionOutcome::Completed(exit) => match exit.status {
                Some(status) => write!(f, "completed with status {}", status),
                None => write!(f, "completed"),
            },
        }
    }
}

/// Run one inbound session to completion.
///
/// Client-facing failures are written to `session.stream` before the
/// stream is shut down. The caller owns the transport and decides how to
/// report the returned outcome.
pub async fn handle_session<S>(state: &GatewayState, session: InboundSession<S>) -> SessionOutcome
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let InboundSession {
        user,
        mut stream,
        pty,
        resizes,
    } = session;

    let identity = TargetIdentity::parse(&user);
    if !identity.is_valid() {
        tracing::warn!("Rejecting session for {:?}: no device id", user);
        reject(&mut stream, INVALID_TARGET_MESSAGE).await;
        return SessionOutcome::InvalidTarget;
    }

    let Some(pty) = pty else {
        tracing::warn!("Rejecting session for {}: no PTY requested", identity);
        reject(&mut stream, PTY_REQUIRED_MESSAGE).await;
        return SessionOutcome::PtyRequired;
    };

    let port = match state.ports.allocate() {
        Ok(port) => port,
        Err(e) => {
            tracing::error!("Port allocation for {} failed: {}", identity.host, e);
            reject(&mut stream, &format!("Failed to allocate tunnel port: {}\n", e)).await;
            return SessionOutcome::PortAllocationFailed;
        }
    };

    let lease = TunnelLease::new(identity.host.clone(), port);
    tracing::info!("Session {} leased {}", identity, lease);

    state.negotiator.connect(&lease).await;
    settle(state.config.tunnel.connect_settle).await;

    let password = prompt_password(&mut stream).await;
    settle(state.config.tunnel.auth_settle).await;

    let target = DialTarget {
        user: identity.user.clone(),
        host: state.config.tunnel.dial_host.clone(),
        port: lease.local_port,
    };

    let mut connection = match state.dialer.dial(&target, &password).await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!("Dial {} failed: {}", target, e);
            reject(&mut stream, &format!("Failed to connect to {}: {}\n", target, e)).await;
            return SessionOutcome::DialFailed;
        }
    };
    drop(password);

    let shell = match connection.open_shell().await {
        Ok(shell) => shell,
        Err(e) => {
            tracing::warn!("Opening session on {} failed: {}", target, e);
            reject(
                &mut stream,
                &format!("Failed to open session on {}: {}\n", target, e),
            )
            .await;
            return SessionOutcome::SessionOpenFailed;
        }
    };

    let exit = run_bridge(
        stream,
        pty,
        resizes,
        shell,
        state.config.outbound.drain_timeout,
    )
    .await;

    state.negotiator.disconnect(&lease).await;

    let outcome = SessionOutcome::Completed(exit);
    tracing::info!("Session {} {}", identity, outcome);
    outcome
}

async fn settle(delay: std::time::Duration) {
    if !delay.is_zero() {
        tracing::debug!("Waiting {:?} for the tunnel", delay);
        tokio::time::sleep(delay).await;
    }
}

/// Tell the client why the session ends and close its stream
async fn reject<S>(stream: &mut S, message: &str)
where
    S: AsyncWrite + Unpin,
{
    if let Err(e) = stream.write_all(message.as_bytes()).await {
        tracing::debug!("Failed to send rejection to client: {}", e);
    }
    if let Err(e) = stream.shutdown().await {
        tracing::debug!("Failed to close client stream: {}", e);
    }
}
