//! Inbound SSH server

mod channel;
mod handler;
mod listener;

pub use channel::InboundChannel;
pub use handler::{GatewayHandler, ServerConfig};
pub use listener::{load_or_generate_host_key, GatewayServer};
