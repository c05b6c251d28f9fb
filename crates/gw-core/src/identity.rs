//! Composite target identity
//!
//! Inbound clients log in as `user@device[:port]`. The SSH username is the
//! only routing input the gateway receives, so everything needed to reach
//! the device is packed into it.

use std::fmt;

/// Port assumed when the identity has no `:port` suffix
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Decoded `user@host[:port]` identity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetIdentity {
    /// Username for the outbound login
    pub user: String,
    /// Remote device identifier
    pub host: String,
    /// Port from the identity text; replaced by the tunnel port before dialing
    pub port: u16,
}

impl TargetIdentity {
    /// Parse a composite identity.
    ///
    /// Never fails. Input without `@` produces an empty identity, which
    /// callers detect through [`TargetIdentity::is_valid`]. Malformed port
    /// text yields port 0.
    pub fn parse(s: &str) -> Self {
        let Some((user, remainder)) = s.split_once('@') else {
            return Self::default();
        };

        let (host, port) = match remainder.split_once(':') {
            Some((host, port_text)) => (host, port_text.parse::<u16>().unwrap_or(0)),
            None => (remainder, DEFAULT_SSH_PORT),
        };

        Self {
            user: user.to_string(),
            host: host.to_string(),
            port,
        }
    }

    /// Whether a device id is present
    pub fn is_valid(&self) -> bool {
        !self.host.is_empty()
    }
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults_port() {
        let id = TargetIdentity::parse("alice@device42");
        assert_eq!(
            id,
            TargetIdentity {
                user: "alice".into(),
                host: "device42".into(),
                port: 22,
            }
        );
        assert!(id.is_valid());
    }

    #[test]
    fn test_parse_explicit_port() {
        let id = TargetIdentity::parse("root@gw-7:2222");
        assert_eq!(id.user, "root");
        assert_eq!(id.host, "gw-7");
        assert_eq!(id.port, 2222);
    }

    #[test]
    fn test_parse_without_at_is_empty() {
        let id = TargetIdentity::parse("device42");
        assert_eq!(id, TargetIdentity::default());
        assert!(!id.is_valid());
    }

    #[test]
    fn test_parse_empty_host_is_invalid() {
        let id = TargetIdentity::parse("bob@");
        assert_eq!(id.user, "bob");
        assert!(!id.is_valid());

        assert!(!TargetIdentity::parse("bob@:22").is_valid());
    }

    #[test]
    fn test_parse_splits_on_first_separators() {
        let id = TargetIdentity::parse("a@b@c:1:2");
        assert_eq!(id.user, "a");
        assert_eq!(id.host, "b@c");
        // "1:2" is not a number
        assert_eq!(id.port, 0);
    }

    #[test]
    fn test_parse_malformed_port_is_zero() {
        assert_eq!(TargetIdentity::parse("alice@device42:ssh").port, 0);
        assert_eq!(TargetIdentity::parse("alice@device42:").port, 0);
        assert_eq!(TargetIdentity::parse("alice@device42:99999").port, 0);
    }

    #[test]
    fn test_parse_is_deterministic() {
        assert_eq!(
            TargetIdentity::parse("alice@device42"),
            TargetIdentity::parse("alice@device42")
        );
    }
}
