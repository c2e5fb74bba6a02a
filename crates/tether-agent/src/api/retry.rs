//! Retry loop and exponential backoff for outbound service calls
//!
//! The retry policy is explicit and injectable: production callers run
//! unbounded (the agent keeps trying through extended outages), tests bound
//! the attempt count and shrink the delays. No attempt is started after
//! cancellation is signaled.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tether_core::config::BackoffConfig;
use tether_core::error::ApiError;

/// Exponential backoff with jitter between retry attempts
pub struct ExponentialBackoff {
    /// Current delay
    current: Duration,
    /// Maximum delay
    max: Duration,
    /// Multiplier
    multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    jitter: f64,
}

impl ExponentialBackoff {
    /// Create a new backoff from configuration
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            current: config.initial,
            max: config.max,
            multiplier: config.multiplier,
            jitter: config.jitter,
        }
    }

    /// Get the next delay and advance the backoff
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;

        let next = Duration::from_secs_f64(self.current.as_secs_f64() * self.multiplier);
        self.current = std::cmp::min(next, self.max);

        let jitter_amount = delay.as_secs_f64() * self.jitter * rand::random::<f64>();
        delay + Duration::from_secs_f64(jitter_amount)
    }
}

/// How many attempts a call may make before surfacing its last error
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// `None` means retry indefinitely
    pub max_attempts: Option<u32>,
    /// Delay growth between attempts
    pub backoff: BackoffConfig,
}

impl RetryPolicy {
    /// Retry forever; the supervisor owns giving up
    pub fn unbounded(backoff: BackoffConfig) -> Self {
        Self {
            max_attempts: None,
            backoff,
        }
    }

    /// Retry at most `max_attempts` times
    pub fn limited(max_attempts: u32, backoff: BackoffConfig) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            backoff,
        }
    }
}

/// Outcome of a single attempt
pub enum Attempt<T> {
    /// The call succeeded
    Done(T),
    /// The call failed in a way that may heal: connectivity loss or a
    /// transient server fault
    Retry(ApiError),
    /// The call failed permanently; retrying cannot help
    Fatal(ApiError),
}

/// Drive `op` until it succeeds, fails permanently, exhausts the attempt
/// budget, or is cancelled. `op` receives the 1-based attempt number.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, ApiError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let mut backoff = ExponentialBackoff::from_config(&policy.backoff);
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        attempt += 1;

        match op(attempt).await {
            Attempt::Done(value) => return Ok(value),
            Attempt::Fatal(err) => return Err(err),
            Attempt::Retry(err) => {
                if let Some(max) = policy.max_attempts {
                    if attempt >= max {
                        return Err(err);
                    }
                }

                let delay = backoff.next_delay();
                tracing::warn!(attempt, delay = ?delay, error = %err, "request failed, retrying");

                tokio::select! {
                    _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
