//! Core domain types

use std::fmt;

/// Terminal dimensions, in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    /// Number of rows
    pub height: u32,
    /// Number of columns
    pub width: u32,
}

impl WindowSize {
    /// Create a new window size
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }
}

impl fmt::Display for WindowSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// PTY negotiated by the inbound client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    /// Value of the client's TERM
    pub term: String,
    /// Size at the time of the request (or of the latest resize before the
    /// shell started)
    pub size: WindowSize,
}

impl PtyRequest {
    /// Create a new PTY request
    pub fn new(term: impl Into<String>, size: WindowSize) -> Self {
        Self {
            term: term.into(),
            size,
        }
    }
}

/// Where the outbound SSH connection goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialTarget {
    /// Login user
    pub user: String,
    /// Host to dial, normally `localhost`
    pub host: String,
    /// Negotiated tunnel port
    pub port: u16,
}

impl DialTarget {
    /// `host:port` socket address text
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for DialTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// How the remote shell ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShellExit {
    /// Exit status reported by the remote side, if any
    pub status: Option<u32>,
}

impl ShellExit {
    /// Shell exited with a reported status
    pub fn with_status(status: u32) -> Self {
        Self {
            status: Some(status),
        }
    }

    /// Channel closed without an exit status
    pub fn unknown() -> Self {
        Self { status: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dial_target_display() {
        let target = DialTarget {
            user: "alice".into(),
            host: "localhost".into(),
            port: 54321,
        };
        assert_eq!(target.to_string(), "alice@localhost:54321");
        assert_eq!(target.address(), "localhost:54321");
    }

    #[test]
    fn test_window_size_display() {
        assert_eq!(WindowSize::new(24, 80).to_string(), "80x24");
    }
}
