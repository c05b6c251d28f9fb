//! Tunnel lease

use serde::{Deserialize, Serialize};
use std::fmt;

/// An ephemeral mapping from a device identifier to a local port.
///
/// A lease exists only through the control messages that mention it: it is
/// created when the connect message is published and released when the
/// disconnect message is published. Nothing keeps the port reserved in
/// between.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TunnelLease {
    /// Remote device identifier
    pub host: String,
    /// Local port the agent is expected to forward to
    pub local_port: u16,
}

impl TunnelLease {
    /// Create a new lease
    pub fn new(host: impl Into<String>, local_port: u16) -> Self {
        Self {
            host: host.into(),
            local_port,
        }
    }
}

impl fmt::Display for TunnelLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> localhost:{}", self.host, self.local_port)
    }
}
