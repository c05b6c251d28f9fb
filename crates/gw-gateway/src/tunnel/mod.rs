//! Tunnel negotiation: local port allocation and connect/disconnect signalling

mod negotiator;
mod port;

pub use negotiator::TunnelNegotiator;
pub use port::{local_port_range, EphemeralPortAllocator, PortAllocator};
