//! Astrolabe error types

use std::fmt;

/// Sentinel string the presentation side recognises as "throttled, try later".
pub const RATE_LIMITED_SENTINEL: &str = "RATE_LIMITED";

/// Where a rate-limit rejection originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitOrigin {
    /// The local sliding window refused the call; nothing was sent.
    Local,
    /// The provider answered HTTP 429.
    Provider,
}

impl RateLimitOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitOrigin::Local => "local",
            RateLimitOrigin::Provider => "provider",
        }
    }
}

impl fmt::Display for RateLimitOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed outcome of a failed fetch.
///
/// Every path through the gateway terminates in either a
/// [`Fetched`](crate::Fetched) value or one of these; raw transport
/// errors never cross this boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Caller's fault: unknown endpoint, missing, mistyped or out-of-range
    /// parameter. Never retried.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Local or provider-side throttling. Retried with backoff.
    #[error("rate limited ({origin})")]
    RateLimited { origin: RateLimitOrigin },

    /// Provider returned a non-200, non-429 status.
    #[error("{message}")]
    Http { status: u16, message: String },

    /// Transport failure, timeout, or a body that is not valid JSON.
    #[error("network error: {0}")]
    Network(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Whether this is a throttling outcome (local or provider).
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GatewayError::RateLimited { .. })
    }

    /// Whether the retry wrapper should try again.
    ///
    /// Retries are confined to rate limiting; every other failure propagates
    /// immediately (or is rescued by a stale cache entry).
    pub fn is_retryable(&self) -> bool {
        self.is_rate_limited()
    }

    /// HTTP status associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            GatewayError::RateLimited {
                origin: RateLimitOrigin::Provider,
            } => Some(429),
            GatewayError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short label for metrics.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "validation",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::Http { .. } => "http",
            GatewayError::Network(_) => "network",
            GatewayError::Configuration(_) => "configuration",
        }
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
