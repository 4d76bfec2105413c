//! Error types for the AI crate.

use std::fmt;

/// Errors from completion-service calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// The transport failed before a reply arrived.
    TransportFailed { reason: String },
    /// The request timed out.
    Timeout,
    /// The reply arrived but could not be decoded.
    MalformedResponse { reason: String },
    /// The service rejected the request for rate limiting.
    RateLimited { retry_after_secs: Option<u64> },
    /// The service returned a well-formed error payload.
    Service { reason: String },
}

impl CompletionError {
    /// Returns true if retrying the request may succeed.
    ///
    /// Transport and decoding failures are retryable; a well-formed error
    /// response from the service is not. Rate limiting carries its own
    /// retry-after hint for the caller rather than being retried blind.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransportFailed { .. } | Self::Timeout | Self::MalformedResponse { .. }
        )
    }
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportFailed { reason } => {
                write!(f, "completion transport failed: {reason}")
            }
            Self::Timeout => write!(f, "completion request timed out"),
            Self::MalformedResponse { reason } => {
                write!(f, "failed to decode completion response: {reason}")
            }
            Self::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "rate limited, retry after {secs}s")
                } else {
                    write!(f, "rate limited")
                }
            }
            Self::Service { reason } => {
                write!(f, "completion service error: {reason}")
            }
        }
    }
}

impl std::error::Error for CompletionError {}
