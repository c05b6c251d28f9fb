//! Control messages for tunnel negotiation
//!
//! # Topic layout
//!
//! ```text
//! connect/<device>      payload: "<port>"   gateway -> agent
//! disconnect/<device>   payload: "<port>"   gateway -> agent
//! ```
//!
//! Both messages are one-way and fire-and-forget. There is no reply topic:
//! the gateway learns that a tunnel is up only by dialing it.

use std::fmt;

use crate::error::ProtocolError;
use crate::lease::TunnelLease;

/// What the agent is asked to do with a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlAction {
    /// Start forwarding the device's SSH service to the leased port
    Connect,
    /// Release the tunnel for the leased port
    Disconnect,
}

impl ControlAction {
    /// Topic prefix for this action
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Connect => "connect",
            ControlAction::Disconnect => "disconnect",
        }
    }

    fn parse(s: &str) -> Result<Self, ProtocolError> {
        match s {
            "connect" => Ok(ControlAction::Connect),
            "disconnect" => Ok(ControlAction::Disconnect),
            other => Err(ProtocolError::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single control-plane message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    /// Requested action
    pub action: ControlAction,
    /// Lease the action applies to
    pub lease: TunnelLease,
}

impl ControlMessage {
    /// Request a tunnel for `lease`
    pub fn connect(lease: TunnelLease) -> Self {
        Self {
            action: ControlAction::Connect,
            lease,
        }
    }

    /// Release the tunnel for `lease`
    pub fn disconnect(lease: TunnelLease) -> Self {
        Self {
            action: ControlAction::Disconnect,
            lease,
        }
    }

    /// Topic the message is published on, e.g. `connect/device42`
    pub fn topic(&self) -> String {
        format!("{}/{}", self.action.as_str(), self.lease.host)
    }

    /// Payload: the decimal ASCII port number
    pub fn payload(&self) -> String {
        self.lease.local_port.to_string()
    }

    /// Decode a message received on `topic` with `payload`.
    ///
    /// The device id is everything after the first `/`, so ids that contain
    /// slashes survive a round trip.
    pub fn decode(topic: &str, payload: &[u8]) -> Result<Self, ProtocolError> {
        let (action, host) = topic
            .split_once('/')
            .ok_or_else(|| ProtocolError::MalformedTopic(topic.to_string()))?;

        let action = ControlAction::parse(action)?;

        if host.is_empty() {
            return Err(ProtocolError::MissingDevice(topic.to_string()));
        }

        let text = String::from_utf8_lossy(payload);
        let local_port = text
            .trim()
            .parse::<u16>()
            .map_err(|_| ProtocolError::InvalidPort(text.to_string()))?;

        Ok(Self {
            action,
            lease: TunnelLease::new(host, local_port),
        })
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.topic(), self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_topic_and_payload() {
        let msg = ControlMessage::connect(TunnelLease::new("device42", 54321));
        assert_eq!(msg.topic(), "connect/device42");
        assert_eq!(msg.payload(), "54321");
        assert_eq!(msg.to_string(), "connect/device42 54321");
    }

    #[test]
    fn test_disconnect_reuses_lease_port() {
        let lease = TunnelLease::new("device42", 40001);
        let msg = ControlMessage::disconnect(lease);
        assert_eq!(msg.topic(), "disconnect/device42");
        assert_eq!(msg.payload(), "40001");
    }

    #[test]
    fn test_decode_connect() {
        let msg = ControlMessage::decode("connect/device42", b"54321").unwrap();
        assert_eq!(msg.action, ControlAction::Connect);
        assert_eq!(msg.lease, TunnelLease::new("device42", 54321));
    }

    #[test]
    fn test_decode_keeps_slashes_in_device_id() {
        let msg = ControlMessage::decode("disconnect/site/a/7", b"2200").unwrap();
        assert_eq!(msg.action, ControlAction::Disconnect);
        assert_eq!(msg.lease.host, "site/a/7");
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert_eq!(
            ControlMessage::decode("connect", b"1"),
            Err(ProtocolError::MalformedTopic("connect".into()))
        );
        assert_eq!(
            ControlMessage::decode("reboot/device42", b"1"),
            Err(ProtocolError::UnknownAction("reboot".into()))
        );
        assert_eq!(
            ControlMessage::decode("connect/", b"1"),
            Err(ProtocolError::MissingDevice("connect/".into()))
        );
        assert!(matches!(
            ControlMessage::decode("connect/device42", b"70000"),
            Err(ProtocolError::InvalidPort(_))
        ));
    }
}
