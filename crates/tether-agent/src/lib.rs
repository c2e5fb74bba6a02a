//! tether-agent: device-side enrollment agent
//!
//! The agent derives a stable device identity, owns a persistent keypair,
//! enrolls the machine with the remote management service and then accepts
//! inbound command-execution requests over a reverse tunnel, running each
//! one as a correctly privilege-dropped local process.

pub mod agent;
pub mod api;
pub mod command;
pub mod identity;
pub mod keys;
pub mod osauth;
pub mod session;
pub mod tunnel;

pub use agent::{Agent, BootstrapError, Stage};

/// Version tag sent to the service with every probe and authorization
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// How this agent is packaged and run
pub const AGENT_PLATFORM: &str = "native";
