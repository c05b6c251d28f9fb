//! Interactive session bridge
//!
//! Runs the PTY-backed shell: the PTY request, then three tasks (resize
//! forwarding, client-to-remote copy, remote-to-client copy) alongside the
//! caller, which waits for the remote shell to exit. If the client is gone
//! in both directions first, the remote channel is closed instead. The
//! tasks are joined before returning so both streams are closed when the
//! bridge ends.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use gw_core::{PtyRequest, ShellExit, WindowSize};

use crate::outbound::{RemoteShell, ShellControl};

/// Bridge `inbound` to `shell` until the remote shell exits.
///
/// Forwarding errors are logged and only stop the loop they occurred in.
/// When client input has ended and the client no longer accepts output,
/// the remote channel is closed rather than waiting on the shell.
/// Output already produced when the shell exits is flushed to the client
/// for at most `drain_timeout`.
pub async fn run_bridge<S>(
    inbound: S,
    pty: PtyRequest,
    resizes: mpsc::Receiver<WindowSize>,
    shell: RemoteShell,
    drain_timeout: Duration,
) -> ShellExit
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (io, control, exit) = shell.into_parts();
    let (mut client_rd, mut client_wr) = tokio::io::split(inbound);
    let (mut remote_rd, mut remote_wr) = tokio::io::split(io);
    let cancel = CancellationToken::new();

    tracing::debug!("Requesting {} PTY of {}", pty.term, pty.size);
    if let Err(e) = control.request_pty(pty).await {
        tracing::warn!("PTY request failed: {}", e);
    }

    let resize_task = tokio::spawn(forward_resizes(resizes, control.clone(), cancel.clone()));

    let (input_done_tx, input_done) = oneshot::channel();
    let input_cancel = cancel.clone();
    let input_task = tokio::spawn(async move {
        tokio::select! {
            _ = input_cancel.cancelled() => {}
            result = tokio::io::copy(&mut client_rd, &mut remote_wr) => {
                match result {
                    Ok(n) => tracing::debug!("Client input closed after {} bytes", n),
                    Err(e) => tracing::warn!("Client to remote copy failed: {}", e),
                }
                if let Err(e) = remote_wr.shutdown().await {
                    tracing::debug!("Failed to close remote input: {}", e);
                }
                let _ = input_done_tx.send(());
            }
        }
    });

    // Reports whether the client stopped accepting output
    let (output_done_tx, output_done) = oneshot::channel();
    let output_cancel = cancel.clone();
    let mut output_task = tokio::spawn(async move {
        tokio::select! {
            _ = output_cancel.cancelled() => {}
            result = tokio::io::copy(&mut remote_rd, &mut client_wr) => {
                let client_failed = match result {
                    Ok(n) => {
                        tracing::debug!("Remote output closed after {} bytes", n);
                        false
                    }
                    Err(e) => {
                        tracing::warn!("Remote to client copy failed: {}", e);
                        true
                    }
                };
                let flushed = client_wr.flush().await;
                if let Err(e) = &flushed {
                    tracing::debug!("Failed to flush client output: {}", e);
                }
                let _ = output_done_tx.send(client_failed || flushed.is_err());
            }
        }
    });

    if let Err(e) = control.request_shell().await {
        tracing::warn!("Shell request failed: {}", e);
    }

    let mut exit_rx = exit;
    let exited = tokio::select! {
        exit = &mut exit_rx => Some(exit.unwrap_or_else(|_| {
            tracing::debug!("Shell driver ended without an exit notification");
            ShellExit::unknown()
        })),
        _ = client_gone(input_done, output_done) => None,
    };

    let exit = match exited {
        Some(exit) => exit,
        None => {
            tracing::info!("Client streams closed before the shell exited, closing remote channel");
            if let Err(e) = control.close().await {
                tracing::debug!("Close request not delivered: {}", e);
            }
            match tokio::time::timeout(drain_timeout, exit_rx).await {
                Ok(Ok(exit)) => exit,
                _ => ShellExit::unknown(),
            }
        }
    };

    let drained = tokio::time::timeout(drain_timeout, &mut output_task)
        .await
        .is_ok();
    if !drained {
        tracing::debug!("Output not drained within {:?}", drain_timeout);
    }

    cancel.cancel();
    for (name, task) in [("resize", resize_task), ("input", input_task)] {
        if let Err(e) = task.await {
            tracing::warn!("{} task failed: {}", name, e);
        }
    }
    if !drained {
        if let Err(e) = output_task.await {
            tracing::warn!("output task failed: {}", e);
        }
    }

    exit
}

/// Resolves once client input has ended and the client refused output.
///
/// Never resolves while either direction is still usable.
async fn client_gone(input_done: oneshot::Receiver<()>, output_done: oneshot::Receiver<bool>) {
    let (input, output) = tokio::join!(input_done, output_done);
    if input.is_ok() && matches!(output, Ok(true)) {
        return;
    }
    std::future::pending::<()>().await
}

/// Forward inbound resize events to the remote channel, in arrival order
async fn forward_resizes(
    mut resizes: mpsc::Receiver<WindowSize>,
    control: ShellControl,
    cancel: CancellationToken,
) {
    loop {
        let size = tokio::select! {
            _ = cancel.cancelled() => break,
            size = resizes.recv() => size,
        };

        let Some(size) = size else { break };

        tracing::trace!("Window change to {}", size);
        if let Err(e) = control.window_change(size).await {
            tracing::warn!("Window change failed: {}", e);
        }
    }
}
