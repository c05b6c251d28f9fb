//! Remote shell handle
//!
//! The outbound channel is owned by a single driver task. The rest of the
//! gateway sees it as a byte stream (remote stdin/stdout) plus an ordered
//! queue of channel requests, and a one-shot exit notification.

use thiserror::Error;
use tokio::io::DuplexStream;
use tokio::sync::{mpsc, oneshot};

use gw_core::{PtyRequest, ShellExit, WindowSize};

/// Request applied to the outbound session channel, in queue order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// Allocate a PTY matching the inbound client's terminal
    RequestPty(PtyRequest),
    /// Propagate a window resize
    WindowChange(WindowSize),
    /// Start the interactive shell
    Shell,
    /// Close the channel without waiting for the shell to exit
    Close,
}

/// The channel driver has gone away
#[derive(Debug, Error)]
#[error("remote shell channel closed")]
pub struct ShellClosed;

/// Cloneable sender for [`ShellCommand`]s
#[derive(Clone)]
pub struct ShellControl {
    commands: mpsc::Sender<ShellCommand>,
}

impl ShellControl {
    /// Request a PTY on the remote side
    pub async fn request_pty(&self, pty: PtyRequest) -> Result<(), ShellClosed> {
        self.send(ShellCommand::RequestPty(pty)).await
    }

    /// Forward a terminal resize
    pub async fn window_change(&self, size: WindowSize) -> Result<(), ShellClosed> {
        self.send(ShellCommand::WindowChange(size)).await
    }

    /// Start the remote shell
    pub async fn request_shell(&self) -> Result<(), ShellClosed> {
        self.send(ShellCommand::Shell).await
    }

    /// Close the remote channel; the exit notification follows
    pub async fn close(&self) -> Result<(), ShellClosed> {
        self.send(ShellCommand::Close).await
    }

    async fn send(&self, command: ShellCommand) -> Result<(), ShellClosed> {
        self.commands.send(command).await.map_err(|_| ShellClosed)
    }
}

/// A remote shell session ready to be bridged
pub struct RemoteShell {
    io: DuplexStream,
    control: ShellControl,
    exit: oneshot::Receiver<ShellExit>,
}

impl RemoteShell {
    /// Assemble a shell from its driver-side endpoints.
    ///
    /// `io` carries remote stdin (writes) and stdout (reads). The driver
    /// consumes `commands` in order and sends on `exit` once the channel has
    /// closed and all output has been written into `io`.
    pub fn new(
        io: DuplexStream,
        commands: mpsc::Sender<ShellCommand>,
        exit: oneshot::Receiver<ShellExit>,
    ) -> Self {
        Self {
            io,
            control: ShellControl { commands },
            exit,
        }
    }

    /// Split into stream, control handle and exit notification
    pub fn into_parts(self) -> (DuplexStream, ShellControl, oneshot::Receiver<ShellExit>) {
        (self.io, self.control, self.exit)
    }
}
