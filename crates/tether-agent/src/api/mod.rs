//! Service API client with resilient retry behavior

mod client;
mod models;
mod retry;

pub use client::ApiClient;
pub use models::{DeviceAuthRequest, DeviceAuthResponse, Endpoints, ServiceInfo};
pub use retry::{run_with_retry, Attempt, ExponentialBackoff, RetryPolicy};
