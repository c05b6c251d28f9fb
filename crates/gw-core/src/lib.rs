//! gw-core: Core abstractions and configuration for the SSH gateway
//!
//! Shared types, error taxonomy and configuration used by the gateway
//! daemon and its tests.

pub mod config;
pub mod error;
pub mod identity;
pub mod types;

pub use identity::TargetIdentity;
pub use types::{DialTarget, PtyRequest, ShellExit, WindowSize};
