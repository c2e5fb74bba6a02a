//! Resilient HTTP client for the management service
//!
//! Every outbound call retries automatically on connectivity failures and
//! on server faults other than 501. Client errors are surfaced as distinct
//! kinds so the enrollment orchestrator can tell "the service said no"
//! apart from "the service could not be reached".

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use tether_core::error::ApiError;
use tether_core::types::ServiceDescriptor;

use super::models::{DeviceAuthRequest, DeviceAuthResponse, ServiceInfo};
use super::retry::{run_with_retry, Attempt, RetryPolicy};

/// Where a response status lands in the retry decision
enum Disposition {
    Success,
    Retry(ApiError),
    Fatal(ApiError),
}

/// Map a response status to its retry disposition.
///
/// 501 is a permanent capability mismatch and is never retried; other 5xx
/// statuses are transient. 404 maps to a distinct not-found outcome.
fn classify_status(status: StatusCode) -> Disposition {
    if status.is_success() {
        return Disposition::Success;
    }

    match status.as_u16() {
        501 => Disposition::Fatal(ApiError::Incompatible),
        s if s >= 500 => Disposition::Retry(ApiError::UnavailableTransient { status: s }),
        404 => Disposition::Fatal(ApiError::NotFound),
        s @ (401 | 403) => Disposition::Fatal(ApiError::Rejected { status: s }),
        s => Disposition::Fatal(ApiError::UnknownStatus { status: s }),
    }
}

/// HTTP client for the management service
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl ApiClient {
    /// Create a client addressed at `service`.
    ///
    /// `timeout` bounds each individual attempt; the retry policy governs
    /// how attempts compose into one logical call.
    pub fn new(
        service: &ServiceDescriptor,
        retry: RetryPolicy,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: service.base_url(),
            retry,
            cancel,
        })
    }

    /// Probe the service for its capability/version descriptor
    pub async fn get_info(&self, agent_version: &str) -> Result<ServiceInfo, ApiError> {
        let url = format!("{}/info", self.base_url);

        run_with_retry(&self.retry, &self.cancel, |_attempt| {
            let request = self
                .http
                .get(url.as_str())
                .query(&[("agent_version", agent_version)]);
            async move { Self::execute_json(request).await }
        })
        .await
    }

    /// Exchange device identity and public key for a bearer token
    pub async fn auth_device(
        &self,
        auth: &DeviceAuthRequest,
    ) -> Result<DeviceAuthResponse, ApiError> {
        let url = format!("{}/api/devices/auth", self.base_url);

        run_with_retry(&self.retry, &self.cancel, |_attempt| {
            let request = self.http.post(url.as_str()).json(auth);
            async move { Self::execute_json(request).await }
        })
        .await
    }

    /// Run one attempt and decode a JSON body on success
    async fn execute_json<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Attempt<T> {
        let response = match request.send().await {
            Ok(response) => response,
            // DNS failure, refused connection, timeout: all retryable
            Err(e) => return Attempt::Retry(ApiError::Unreachable(e)),
        };

        match classify_status(response.status()) {
            Disposition::Success => match response.json::<T>().await {
                Ok(value) => Attempt::Done(value),
                Err(e) => Attempt::Fatal(ApiError::Decode(e)),
            },
            Disposition::Retry(err) => Attempt::Retry(err),
            Disposition::Fatal(err) => Attempt::Fatal(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_implemented_is_fatal() {
        assert!(matches!(
            classify_status(StatusCode::NOT_IMPLEMENTED),
            Disposition::Fatal(ApiError::Incompatible)
        ));
    }

    #[test]
    fn test_server_faults_are_transient() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(matches!(
                classify_status(status),
                Disposition::Retry(ApiError::UnavailableTransient { .. })
            ));
        }
    }

    #[test]
    fn test_not_found_is_distinguishable() {
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND),
            Disposition::Fatal(ApiError::NotFound)
        ));
    }

    #[test]
    fn test_refusals_map_to_rejected() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED),
            Disposition::Fatal(ApiError::Rejected { status: 401 })
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN),
            Disposition::Fatal(ApiError::Rejected { status: 403 })
        ));
    }

    #[test]
    fn test_unexpected_status_is_surfaced_as_is() {
        assert!(matches!(
            classify_status(StatusCode::IM_A_TEAPOT),
            Disposition::Fatal(ApiError::UnknownStatus { status: 418 })
        ));
    }

    #[test]
    fn test_success_statuses() {
        assert!(matches!(
            classify_status(StatusCode::OK),
            Disposition::Success
        ));
        assert!(matches!(
            classify_status(StatusCode::CREATED),
            Disposition::Success
        ));
    }
}
