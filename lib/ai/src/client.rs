//! Retrying completion client.
//!
//! Wraps a [`CompletionBackend`] with the retry policy owned by this core:
//! a capped attempt count with jittered exponential backoff, applied only
//! to transport and decoding failures. A well-formed error response from
//! the service is returned immediately.

use crate::backend::{CompletionBackend, CompletionRequest, CompletionResponse};
use crate::error::CompletionError;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument, warn};

/// Retry configuration with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (1 = no retry).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling on any single delay.
    pub max_delay: Duration,
    /// Jitter ratio (0.0-1.0) applied around the computed delay.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(40),
            jitter_ratio: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy that disables retries (single attempt).
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the maximum number of attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the ceiling on any single delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the jitter ratio (clamped to 0.0-1.0).
    #[must_use]
    pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Computes the jittered delay before retrying after `attempt`
    /// (zero-based) failed attempts.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let factor = 1.0 + self.jitter_ratio * (2.0 * jitter_fraction() - 1.0);
        exponential.mul_f64(factor.max(0.0)).min(self.max_delay)
    }
}

/// Pseudo-random fraction in [0, 1) seeded from the clock. Enough spread
/// to desynchronize concurrent retriers without pulling in an RNG crate.
fn jitter_fraction() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    f64::from(nanos % 1_000) / 1_000.0
}

/// A completion client wrapping a backend with the retry policy.
pub struct CompletionClient<B: CompletionBackend> {
    backend: B,
    policy: RetryPolicy,
}

impl<B: CompletionBackend> CompletionClient<B> {
    /// Creates a client with the default retry policy.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            policy: RetryPolicy::default(),
        }
    }

    /// Creates a client with an explicit retry policy.
    pub fn with_policy(backend: B, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Returns the retry policy in effect.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns the wrapped backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Issues a completion request, retrying retryable failures.
    ///
    /// # Errors
    ///
    /// Returns the last [`CompletionError`] once attempts are exhausted,
    /// or immediately for a non-retryable failure.
    #[instrument(skip(self, request), fields(message_count = request.messages.len(), tool_count = request.tools.len()))]
    pub async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        let mut attempt = 0;
        loop {
            match self.backend.complete(request).await {
                Ok(response) => {
                    debug!(attempt = attempt + 1, "completion succeeded");
                    return Ok(response);
                }
                Err(error) if error.is_retryable() && attempt + 1 < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "completion attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
