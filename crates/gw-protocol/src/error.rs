//! Protocol error types

use thiserror::Error;

/// Errors that can occur while decoding control messages
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// Topic does not have the `<action>/<device>` shape
    #[error("Malformed topic: {0}")]
    MalformedTopic(String),

    /// Topic action is neither `connect` nor `disconnect`
    #[error("Unknown control action: {0}")]
    UnknownAction(String),

    /// Device identifier segment is empty
    #[error("Missing device id in topic: {0}")]
    MissingDevice(String),

    /// Payload is not a decimal port number
    #[error("Invalid port payload: {0:?}")]
    InvalidPort(String),
}
