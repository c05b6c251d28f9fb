//! Gateway configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Configuration for the gateway daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the public SSH endpoint listens on
    pub bind_address: String,

    /// Path to the SSH host key (generated on first start if missing)
    pub host_key_path: PathBuf,

    /// How long shutdown waits for running sessions to release their tunnels
    #[serde(with = "duration_secs")]
    pub shutdown_timeout: Duration,

    /// Control-plane broker
    pub broker: BrokerConfig,

    /// Tunnel negotiation timing
    pub tunnel: TunnelConfig,

    /// Outbound SSH connection settings
    pub outbound: OutboundConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:22".to_string(),
            host_key_path: super::default_config_dir().join("host_key"),
            shutdown_timeout: Duration::from_secs(10),
            broker: BrokerConfig::default(),
            tunnel: TunnelConfig::default(),
            outbound: OutboundConfig::default(),
        }
    }
}

/// MQTT broker used for tunnel connect/disconnect messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker hostname
    pub host: String,

    /// Broker port
    pub port: u16,

    /// MQTT client identifier
    pub client_id: String,

    /// MQTT keep-alive interval
    #[serde(with = "duration_secs")]
    pub keep_alive: Duration,

    /// How long a session waits for a publish to be accepted locally
    #[serde(with = "duration_secs")]
    pub publish_timeout: Duration,

    /// Reconnect backoff
    pub backoff: BackoffConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: format!("ssh-gateway-{}", std::process::id()),
            keep_alive: Duration::from_secs(30),
            publish_timeout: Duration::from_secs(5),
            backoff: BackoffConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// `host:port` of the broker
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

/// Timing of the tunnel handshake.
///
/// There is no acknowledgement from the agent, so the gateway waits a fixed
/// time after publishing the connect message and again after reading the
/// password before it dials the tunnel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Host the tunnel is reachable on
    pub dial_host: String,

    /// Wait after publishing the connect message
    #[serde(with = "duration_secs")]
    pub connect_settle: Duration,

    /// Wait after the password has been read
    #[serde(with = "duration_secs")]
    pub auth_settle: Duration,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            dial_host: "localhost".to_string(),
            connect_settle: Duration::from_secs(5),
            auth_settle: Duration::from_secs(5),
        }
    }
}

/// Trust policy for the outbound host key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Accept any host key presented through the tunnel
    #[default]
    AcceptAny,
    /// Accept only keys listed in `trusted_fingerprints`
    Pinned,
}

/// Outbound SSH connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboundConfig {
    /// Host key trust policy
    pub host_key_policy: HostKeyPolicy,

    /// SHA-256 fingerprints accepted under [`HostKeyPolicy::Pinned`]
    pub trusted_fingerprints: Vec<String>,

    /// Upper bound on dial + handshake
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Time allowed to flush remote output after the shell exits
    #[serde(with = "duration_secs")]
    pub drain_timeout: Duration,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            host_key_policy: HostKeyPolicy::AcceptAny,
            trusted_fingerprints: vec![],
            connect_timeout: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(2),
        }
    }
}
