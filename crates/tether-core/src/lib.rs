//! tether-core: Core abstractions and configuration for tether
//!
//! This crate provides the shared types, error taxonomy and configuration
//! structures used by the agent binary and its tests.

pub mod config;
pub mod error;
pub mod types;

pub use error::{ApiError, ConfigError, IdentityError, TunnelError};
pub use types::{DeviceIdentity, DeviceInfo, ServiceDescriptor};
