//! Shared gateway state
//!
//! Built once at startup and shared by every session. Nothing in here is
//! mutated per session.

use std::sync::Arc;

use gw_core::config::GatewayConfig;

use crate::control::ControlPublisher;
use crate::outbound::{Dialer, SshDialer};
use crate::tunnel::{EphemeralPortAllocator, PortAllocator, TunnelNegotiator};

/// Process-wide collaborators injected into each session
pub struct GatewayState {
    /// Loaded configuration
    pub config: GatewayConfig,
    /// Connect/disconnect signalling
    pub negotiator: TunnelNegotiator,
    /// Tunnel port source
    pub ports: Arc<dyn PortAllocator>,
    /// Outbound SSH dialer
    pub dialer: Arc<dyn Dialer>,
}

impl GatewayState {
    /// Production state: OS-assigned ports and the russh dialer
    pub fn new(config: GatewayConfig, publisher: Arc<dyn ControlPublisher>) -> Self {
        let dialer = Arc::new(SshDialer::new(&config.outbound));
        Self::with_parts(config, publisher, Arc::new(EphemeralPortAllocator), dialer)
    }

    /// Assemble state from explicit parts
    pub fn with_parts(
        config: GatewayConfig,
        publisher: Arc<dyn ControlPublisher>,
        ports: Arc<dyn PortAllocator>,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        Self {
            config,
            negotiator: TunnelNegotiator::new(publisher),
            ports,
            dialer,
        }
    }
}
