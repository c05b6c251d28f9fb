//! Control-plane client for tunnel negotiation

mod backoff;
mod mqtt;

pub use backoff::ExponentialBackoff;
pub use mqtt::{MqttControl, MqttEventLoop};

use async_trait::async_trait;

use gw_core::error::ControlError;
use gw_protocol::ControlMessage;

/// Publish-only handle to the control plane.
///
/// One instance is shared by every session, so implementations must accept
/// concurrent calls.
#[async_trait]
pub trait ControlPublisher: Send + Sync {
    /// Publish `message`, returning once the local client has accepted it
    async fn publish(&self, message: &ControlMessage) -> Result<(), ControlError>;
}
