//! ssh-gateway: Relay `user@device` SSH logins through agent-opened tunnels
//!
//! Clients connect to a single public SSH endpoint. For each session the
//! gateway picks a free local port, asks the device's agent over MQTT to
//! forward its SSH service to that port, prompts for the password, dials
//! the tunnel and bridges the interactive shell until it exits.

pub mod control;
pub mod outbound;
pub mod server;
pub mod session;
pub mod state;
pub mod tunnel;

pub use session::{handle_session, InboundSession, SessionOutcome};
pub use state::GatewayState;
