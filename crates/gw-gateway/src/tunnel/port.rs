//! Ephemeral port allocation
//!
//! The OS picks the port: we bind port 0, read back what we got and close
//! the socket again. The port is not held while the agent sets up its
//! forward, so another process may grab it in between. That race is
//! accepted; nothing here tracks ports across sessions.

use std::net::{Ipv4Addr, Ipv6Addr, TcpListener};

use gw_core::error::TunnelError;

/// Where Linux publishes the ephemeral port range
const LOCAL_PORT_RANGE_PATH: &str = "/proc/sys/net/ipv4/ip_local_port_range";

/// Source of local tunnel ports
pub trait PortAllocator: Send + Sync {
    /// Return a port that was free at the time of the call
    fn allocate(&self) -> Result<u16, TunnelError>;
}

/// Asks the OS for an unused port on the wildcard address
#[derive(Debug, Clone, Copy, Default)]
pub struct EphemeralPortAllocator;

impl PortAllocator for EphemeralPortAllocator {
    fn allocate(&self) -> Result<u16, TunnelError> {
        let listener = match TcpListener::bind((Ipv6Addr::UNSPECIFIED, 0)) {
            Ok(listener) => listener,
            Err(e) => {
                tracing::debug!("IPv6 wildcard bind failed ({}), using IPv4", e);
                TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(TunnelError::PortAllocation)?
            }
        };

        let port = listener
            .local_addr()
            .map_err(TunnelError::PortAllocation)?
            .port();

        drop(listener);
        Ok(port)
    }
}

/// Read the OS ephemeral port range, if the platform exposes it
pub fn local_port_range() -> Option<(u16, u16)> {
    let text = std::fs::read_to_string(LOCAL_PORT_RANGE_PATH).ok()?;
    parse_port_range(&text)
}

fn parse_port_range(text: &str) -> Option<(u16, u16)> {
    let mut parts = text.split_whitespace().map(str::parse::<u16>);
    match (parts.next(), parts.next()) {
        (Some(Ok(start)), Some(Ok(end))) if start <= end => Some((start, end)),
        _ => None,
    }
}
