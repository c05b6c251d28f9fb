//! gw-protocol: Control-plane messages for the SSH gateway
//!
//! The gateway never talks to remote agents directly. Tunnels are requested
//! and released by publishing small text messages on a pub/sub broker:
//!
//! - `connect/<device>` with the decimal local port the agent should forward to
//! - `disconnect/<device>` with the same port once the session is over
//!
//! This crate owns the topic layout and payload encoding so that the gateway
//! and any agent implementation agree on the wire format.

pub mod error;
pub mod lease;
pub mod message;

pub use error::ProtocolError;
pub use lease::TunnelLease;
pub use message::{ControlAction, ControlMessage};
