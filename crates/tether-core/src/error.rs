//! Core error types for tether

use std::path::PathBuf;
use thiserror::Error;

/// Device identity resolution errors
#[derive(Error, Debug)]
pub enum IdentityError {
    /// No non-loopback interface with a hardware address was found
    #[error("no usable network interface with a hardware address")]
    NoInterface,
}

/// Errors returned by the service API client.
///
/// Connectivity failures and transient server faults are retried inside the
/// client; the variants here are what a single logical call can surface to
/// its caller. The orchestrator's recovery policy differs per variant, so
/// none of them may be collapsed into another.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The service could not be reached at the transport level
    #[error("connection failed: {0}")]
    Unreachable(#[source] reqwest::Error),

    /// The service explicitly refused the request (401/403)
    #[error("request rejected by service (status {status})")]
    Rejected { status: u16 },

    /// The requested resource does not exist (404)
    #[error("not found")]
    NotFound,

    /// The service answered 501: a permanent capability mismatch
    #[error("service does not implement this endpoint (501)")]
    Incompatible,

    /// A server fault (5xx other than 501) that outlived the retry budget
    #[error("service unavailable (status {status})")]
    UnavailableTransient { status: u16 },

    /// A status code outside the known contract
    #[error("unexpected service response (status {status})")]
    UnknownStatus { status: u16 },

    /// The response body could not be decoded
    #[error("invalid response payload: {0}")]
    Decode(#[source] reqwest::Error),

    /// The call was cancelled before it could complete
    #[error("request cancelled")]
    Cancelled,
}

/// Reverse-tunnel transport errors
#[derive(Error, Debug)]
#[error("tunnel transport error: {0}")]
pub struct TunnelError(pub String);

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Server address is not a valid URL
    #[error("Invalid server address '{0}': {1}")]
    InvalidServerAddress(String, String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
