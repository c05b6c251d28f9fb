//! Test doubles shared by the integration tests
//!
//! The control plane records what would be published and the dialer hands
//! out a scripted remote shell.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot};

use gw_core::config::{GatewayConfig, OutboundConfig, TunnelConfig};
use gw_core::error::{ControlError, OutboundError, TunnelError};
use gw_core::{DialTarget, ShellExit};
use gw_protocol::ControlMessage;
use ssh_gateway::control::ControlPublisher;
use ssh_gateway::outbound::{Dialer, OutboundConnection, RemoteShell, ShellCommand};
use ssh_gateway::tunnel::PortAllocator;

#[derive(Default)]
pub struct RecordingPublisher {
    pub sent: Mutex<Vec<ControlMessage>>,
}

impl RecordingPublisher {
    pub fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| format!("{} {}", m.topic(), m.payload()))
            .collect()
    }
}

#[async_trait]
impl ControlPublisher for RecordingPublisher {
    async fn publish(&self, message: &ControlMessage) -> Result<(), ControlError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub struct FixedPorts(pub u16);

impl PortAllocator for FixedPorts {
    fn allocate(&self) -> Result<u16, TunnelError> {
        Ok(self.0)
    }
}

/// Hands out consecutive ports, one per session
pub struct SequentialPorts(AtomicU16);

impl SequentialPorts {
    pub fn starting_at(port: u16) -> Self {
        Self(AtomicU16::new(port))
    }
}

impl PortAllocator for SequentialPorts {
    fn allocate(&self) -> Result<u16, TunnelError> {
        Ok(self.0.fetch_add(1, Ordering::SeqCst))
    }
}

pub struct NoPorts;

impl PortAllocator for NoPorts {
    fn allocate(&self) -> Result<u16, TunnelError> {
        Err(TunnelError::PortAllocation(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            "no ports left",
        )))
    }
}

#[derive(Clone, Copy)]
pub enum DialMode {
    Refuse,
    FailOpen,
    Accept,
}

pub struct FakeDialer {
    mode: DialMode,
    dialed: Mutex<Vec<(DialTarget, String)>>,
    commands: Arc<Mutex<Vec<ShellCommand>>>,
}

impl FakeDialer {
    pub fn new(mode: DialMode) -> Self {
        Self {
            mode,
            dialed: Mutex::new(Vec::new()),
            commands: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn dialed(&self) -> Vec<(String, String)> {
        self.dialed
            .lock()
            .unwrap()
            .iter()
            .map(|(target, password)| (target.to_string(), password.clone()))
            .collect()
    }

    pub fn commands(&self) -> Vec<ShellCommand> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dialer for FakeDialer {
    async fn dial(
        &self,
        target: &DialTarget,
        password: &str,
    ) -> Result<Box<dyn OutboundConnection>, OutboundError> {
        self.dialed
            .lock()
            .unwrap()
            .push((target.clone(), password.to_string()));

        match self.mode {
            DialMode::Refuse => Err(OutboundError::Connect("connection refused".into())),
            mode => Ok(Box::new(FakeConnection {
                mode,
                commands: Arc::clone(&self.commands),
            })),
        }
    }
}

pub struct FakeConnection {
    mode: DialMode,
    commands: Arc<Mutex<Vec<ShellCommand>>>,
}

#[async_trait]
impl OutboundConnection for FakeConnection {
    async fn open_shell(&mut self) -> Result<RemoteShell, OutboundError> {
        if let DialMode::FailOpen = self.mode {
            return Err(OutboundError::SessionOpen("channel refused".into()));
        }

        let (bridge_end, remote_end) = tokio::io::duplex(4096);
        let (command_tx, command_rx) = mpsc::channel(16);
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(fake_remote(
            remote_end,
            command_rx,
            exit_tx,
            Arc::clone(&self.commands),
        ));

        Ok(RemoteShell::new(bridge_end, command_tx, exit_rx))
    }
}

/// Greets when the shell starts and exits with status 0 on `exit\r`
pub async fn fake_remote(
    mut io: DuplexStream,
    mut commands: mpsc::Receiver<ShellCommand>,
    exit: oneshot::Sender<ShellExit>,
    log: Arc<Mutex<Vec<ShellCommand>>>,
) {
    let mut typed = Vec::new();
    let mut buf = [0u8; 256];
    let mut commands_open = true;

    loop {
        tokio::select! {
            command = commands.recv(), if commands_open => match command {
                Some(command) => {
                    let start_shell = command == ShellCommand::Shell;
                    log.lock().unwrap().push(command);
                    if start_shell {
                        io.write_all(b"welcome\r\n").await.unwrap();
                    }
                }
                None => commands_open = false,
            },
            read = io.read(&mut buf) => match read {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    typed.extend_from_slice(&buf[..n]);
                    if typed.windows(5).any(|w| w == b"exit\r") {
                        io.write_all(b"logout\r\n").await.unwrap();
                        break;
                    }
                }
            },
        }
    }

    drop(io);
    let _ = exit.send(ShellExit::with_status(0));
}

pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        tunnel: TunnelConfig {
            connect_settle: Duration::ZERO,
            auth_settle: Duration::ZERO,
            ..TunnelConfig::default()
        },
        outbound: OutboundConfig {
            drain_timeout: Duration::from_secs(1),
            ..OutboundConfig::default()
        },
        ..GatewayConfig::default()
    }
}
