//! Inbound channel adapter
//!
//! Turns one russh server channel into the byte stream the session flow
//! works on. Client data is queued to an input task that writes it into an
//! in-memory pipe; an output task reads the other direction and sends it
//! back on the channel. When the session ends the exit status, EOF and
//! close go out after the last byte of output.

use std::sync::Arc;

use russh::server::Handle;
use russh::{ChannelId, CryptoVec};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use gw_core::{PtyRequest, WindowSize};

use crate::session::{handle_session, InboundSession};
use crate::state::GatewayState;

/// Capacity of the pipe between the channel and the session flow
const PIPE_CAPACITY: usize = 64 * 1024;

/// Client data chunks waiting to be written into the pipe
const INPUT_QUEUE_CAPACITY: usize = 256;

/// Window changes waiting for the bridge
const RESIZE_QUEUE_CAPACITY: usize = 64;

/// Read buffer for session output
const OUTPUT_BUFFER_SIZE: usize = 32 * 1024;

/// Per-channel state held by the connection handler
pub struct InboundChannel {
    id: ChannelId,
    pty: Option<PtyRequest>,
    input_tx: Option<mpsc::Sender<Vec<u8>>>,
    input_rx: Option<mpsc::Receiver<Vec<u8>>>,
    resize_tx: mpsc::Sender<WindowSize>,
    resize_rx: Option<mpsc::Receiver<WindowSize>>,
}

impl InboundChannel {
    /// Track a newly opened session channel
    pub fn new(id: ChannelId) -> Self {
        let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE_CAPACITY);
        let (resize_tx, resize_rx) = mpsc::channel(RESIZE_QUEUE_CAPACITY);

        Self {
            id,
            pty: None,
            input_tx: Some(input_tx),
            input_rx: Some(input_rx),
            resize_tx,
            resize_rx: Some(resize_rx),
        }
    }

    /// Whether the session flow has been started on this channel
    pub fn started(&self) -> bool {
        self.resize_rx.is_none()
    }

    /// Record the client's PTY request
    pub fn set_pty(&mut self, pty: PtyRequest) {
        self.pty = Some(pty);
    }

    /// Apply a window change.
    ///
    /// Before the session starts this only updates the PTY that will be
    /// requested; afterwards the size is queued for the bridge.
    pub fn resize(&mut self, size: WindowSize) {
        if !self.started() {
            if let Some(pty) = self.pty.as_mut() {
                pty.size = size;
            }
            return;
        }

        if let Err(e) = self.resize_tx.try_send(size) {
            tracing::warn!("Dropping window change on {:?}: {}", self.id, e);
        }
    }

    /// Queue client data for the session
    pub async fn push_input(&self, data: &[u8]) {
        let Some(input_tx) = &self.input_tx else {
            tracing::debug!("Ignoring data after EOF on {:?}", self.id);
            return;
        };

        if input_tx.send(data.to_vec()).await.is_err() {
            tracing::debug!("Session input on {:?} already closed", self.id);
        }
    }

    /// Client sent EOF: no more input
    pub fn close_input(&mut self) {
        self.input_tx = None;
    }

    /// Start the session flow for `user` on this channel.
    ///
    /// The session task is spawned on `sessions`. Once `shutdown` fires,
    /// client input is closed and output is no longer forwarded, so the
    /// session can wind down and release its tunnel. Returns false if the
    /// session was already running.
    pub fn start(
        &mut self,
        user: String,
        state: Arc<GatewayState>,
        handle: Handle,
        sessions: &TaskTracker,
        shutdown: CancellationToken,
    ) -> bool {
        let (Some(resizes), Some(input_rx)) = (self.resize_rx.take(), self.input_rx.take()) else {
            return false;
        };

        let (session_end, channel_end) = tokio::io::duplex(PIPE_CAPACITY);
        let (channel_rd, channel_wr) = tokio::io::split(channel_end);
        let id = self.id;

        tokio::spawn(pump_input(input_rx, channel_wr, shutdown.clone()));
        let output = tokio::spawn(pump_output(channel_rd, handle.clone(), id, shutdown));

        let session = InboundSession {
            user,
            stream: session_end,
            pty: self.pty.clone(),
            resizes,
        };

        sessions.spawn(async move {
            let outcome = handle_session(&state, session).await;

            if let Err(e) = output.await {
                tracing::warn!("Output pump for {:?} failed: {}", id, e);
            }

            if let Some(status) = outcome.exit_status() {
                if handle.exit_status_request(id, status).await.is_err() {
                    tracing::debug!("Client left before exit status on {:?}", id);
                }
            }
            let _ = handle.eof(id).await;
            let _ = handle.close(id).await;

            tracing::debug!("Channel {:?} finished: {}", id, outcome);
        });

        true
    }
}

/// Write queued client data into the pipe, then close it
async fn pump_input(
    mut input: mpsc::Receiver<Vec<u8>>,
    mut pipe: WriteHalf<DuplexStream>,
    shutdown: CancellationToken,
) {
    loop {
        let data = tokio::select! {
            _ = shutdown.cancelled() => break,
            data = input.recv() => data,
        };

        let Some(data) = data else { break };
        if let Err(e) = pipe.write_all(&data).await {
            tracing::debug!("Session stopped reading input: {}", e);
            return;
        }
    }

    let _ = pipe.shutdown().await;
}

/// Send session output to the client until either side goes away.
///
/// Returning drops the pipe, so the session sees its next write fail.
async fn pump_output(
    mut pipe: ReadHalf<DuplexStream>,
    handle: Handle,
    id: ChannelId,
    shutdown: CancellationToken,
) {
    let mut buf = vec![0u8; OUTPUT_BUFFER_SIZE];

    loop {
        let read = tokio::select! {
            _ = shutdown.cancelled() => break,
            read = pipe.read(&mut buf) => read,
        };

        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!("Session output on {:?} failed: {}", id, e);
                break;
            }
        };

        if handle.data(id, CryptoVec::from_slice(&buf[..n])).await.is_err() {
            tracing::debug!("Client on {:?} stopped accepting data", id);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_input_pump_closes_pipe_after_queue() {
        let (tx, rx) = mpsc::channel(4);
        let (session_end, channel_end) = tokio::io::duplex(64);
        let (_channel_rd, channel_wr) = tokio::io::split(channel_end);
        let (mut session_rd, _session_wr) = tokio::io::split(session_end);

        let pump = tokio::spawn(pump_input(rx, channel_wr, CancellationToken::new()));
        tx.send(b"s3cret".to_vec()).await.unwrap();
        tx.send(b"\r".to_vec()).await.unwrap();
        drop(tx);
        pump.await.unwrap();

        let mut received = Vec::new();
        session_rd.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"s3cret\r");
    }

    #[tokio::test]
    async fn test_input_pump_closes_pipe_on_shutdown() {
        let (tx, rx) = mpsc::channel(4);
        let (session_end, channel_end) = tokio::io::duplex(64);
        let (_channel_rd, channel_wr) = tokio::io::split(channel_end);
        let (mut session_rd, _session_wr) = tokio::io::split(session_end);
        let shutdown = CancellationToken::new();

        let pump = tokio::spawn(pump_input(rx, channel_wr, shutdown.clone()));
        tx.send(b"ls\r".to_vec()).await.unwrap();

        let mut typed = [0u8; 3];
        session_rd.read_exact(&mut typed).await.unwrap();
        assert_eq!(&typed, b"ls\r");

        // The client is still connected, but the session sees EOF
        shutdown.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(2), pump)
            .await
            .expect("input pump ignored shutdown")
            .unwrap();

        let mut rest = Vec::new();
        session_rd.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        drop(tx);
    }
}
