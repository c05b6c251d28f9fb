//! Outbound SSH connection through the negotiated tunnel

mod shell;
mod ssh;

pub use shell::{RemoteShell, ShellClosed, ShellCommand, ShellControl};
pub use ssh::{host_key_trusted, SshDialer};

use async_trait::async_trait;

use gw_core::error::OutboundError;
use gw_core::DialTarget;

/// Opens authenticated outbound connections
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Connect to `target` and authenticate with `password`
    async fn dial(
        &self,
        target: &DialTarget,
        password: &str,
    ) -> Result<Box<dyn OutboundConnection>, OutboundError>;
}

/// An authenticated outbound connection
#[async_trait]
pub trait OutboundConnection: Send {
    /// Open the session channel the interactive shell will run on.
    ///
    /// A connection hosts a single shell; calling this twice is an error.
    async fn open_shell(&mut self) -> Result<RemoteShell, OutboundError>;
}
