//! Core error types for the gateway

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Control-plane (pub/sub) errors
#[derive(Error, Debug)]
pub enum ControlError {
    /// The broker client refused or failed the publish
    #[error("Publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    /// The publish was not confirmed locally in time
    #[error("Publish to {topic} timed out after {timeout:?}")]
    Timeout { topic: String, timeout: Duration },
}

/// Tunnel negotiation errors
#[derive(Error, Debug)]
pub enum TunnelError {
    /// No local port could be obtained from the OS
    #[error("Port allocation failed: {0}")]
    PortAllocation(#[source] std::io::Error),
}

/// Outbound SSH connection errors
///
/// The display text of these variants is shown to the inbound client, so
/// it carries the underlying cause verbatim.
#[derive(Error, Debug)]
pub enum OutboundError {
    /// TCP connect or SSH handshake failed
    #[error("{0}")]
    Connect(String),

    /// Dial did not complete within the configured timeout
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    /// The remote host key was not accepted by the trust policy
    #[error("host key rejected")]
    HostKeyRejected,

    /// Password authentication was refused
    #[error("unable to authenticate as {0}")]
    AuthenticationFailed(String),

    /// Session channel could not be opened
    #[error("{0}")]
    SessionOpen(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_error_text_is_cause_only() {
        let err = OutboundError::Connect("Connection refused (os error 111)".into());
        assert_eq!(err.to_string(), "Connection refused (os error 111)");
    }

    #[test]
    fn test_control_error_names_topic() {
        let err = ControlError::Timeout {
            topic: "connect/device42".into(),
            timeout: Duration::from_secs(2),
        };
        assert_eq!(
            err.to_string(),
            "Publish to connect/device42 timed out after 2s"
        );
    }
}
