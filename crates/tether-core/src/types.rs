//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;

/// The stable identity the service uses to recognize this machine.
///
/// Either an operator-supplied override or the hardware address of the
/// primary network interface. Immutable once resolved for the lifetime of
/// the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub mac: String,
}

impl DeviceIdentity {
    pub fn new(mac: impl Into<String>) -> Self {
        Self { mac: mac.into() }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mac)
    }
}

/// Descriptive, non-identifying device metadata, derived once at bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// OS distribution id (e.g. "debian")
    pub id: String,
    /// Human-readable OS name
    pub pretty_name: String,
    /// Agent version tag
    pub version: String,
    /// CPU architecture
    pub arch: String,
    /// Platform label (how the agent is packaged/run)
    pub platform: String,
}

/// A reachable endpoint for the remote management service.
///
/// Fixed at construction; every outward call is addressed through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl ServiceDescriptor {
    /// Parse a server address URL such as `http://cloud.example.com:8080`
    pub fn parse(address: &str) -> Result<Self, ConfigError> {
        let url = reqwest::Url::parse(address)
            .map_err(|e| ConfigError::InvalidServerAddress(address.to_string(), e.to_string()))?;

        let host = url
            .host_str()
            .ok_or_else(|| {
                ConfigError::InvalidServerAddress(address.to_string(), "missing host".to_string())
            })?
            .to_string();

        let port = url.port_or_known_default().ok_or_else(|| {
            ConfigError::InvalidServerAddress(address.to_string(), "missing port".to_string())
        })?;

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            port,
        })
    }

    /// Base URL for API requests
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_url())
    }
}
