//! Agent configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Configuration for the device agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Management service address, e.g. `http://cloud.example.com:8080`
    pub server_address: String,

    /// Tenant (namespace) this device enrolls under
    pub tenant_id: String,

    /// Operator-supplied device identity override.
    ///
    /// When set and non-empty it is used verbatim and no network interface
    /// probing occurs.
    pub preferred_identity: Option<String>,

    /// Preferred device hostname, sent with the authorization request
    pub preferred_hostname: Option<String>,

    /// Path to the PEM private key file (generated on first start)
    pub private_key_path: PathBuf,

    /// Backoff configuration for transport retries
    pub backoff: BackoffConfig,

    /// Per-attempt request timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_address: "http://localhost:8080".to_string(),
            tenant_id: String::new(),
            preferred_identity: None,
            preferred_hostname: None,
            private_key_path: super::default_config_dir().join("agent_key.pem"),
            backoff: BackoffConfig::default(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl AgentConfig {
    /// The hostname announced during authorization, falling back to the
    /// machine's own hostname.
    pub fn hostname(&self) -> String {
        self.preferred_hostname
            .clone()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| gethostname::gethostname().to_string_lossy().into_owned())
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}
