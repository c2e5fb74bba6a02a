//! Wire models for the management service API

use serde::{Deserialize, Serialize};

use tether_core::types::{DeviceIdentity, DeviceInfo};

/// Service capability/version descriptor returned by the info probe
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceInfo {
    pub version: String,
    #[serde(default)]
    pub endpoints: Endpoints,
}

/// Endpoints advertised by the service
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Endpoints {
    #[serde(default)]
    pub api: String,
    #[serde(default)]
    pub ssh: String,
}

/// Device authorization request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthRequest {
    pub info: DeviceInfo,
    pub hostname: String,
    pub identity: DeviceIdentity,
    pub tenant_id: String,
    /// SPKI PEM encoding of the device public key
    pub public_key: String,
}

/// Result of a successful authorization handshake
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceAuthResponse {
    #[serde(default)]
    pub uid: String,
    /// Opaque bearer token, required to request the tunnel handle
    pub token: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}
