//! Error types for the resilience layer.
//!
//! Two refusals are raised to callers before a request is sent: a client-side
//! rate limit refusal and an open circuit. Store and configuration failures are
//! surfaced separately so callers can tell "not allowed" from "broken".

use std::time::Duration;
use thiserror::Error;

/// Result type for resilience operations
pub type ResilienceResult<T> = Result<T, ResilienceError>;

/// Root error type for the resilience layer
#[derive(Error, Debug, Clone)]
pub enum ResilienceError {
    /// Request refused by a rate limit
    #[error("Rate limit error: {0}")]
    RateLimit(#[from] RateLimitExceeded),

    /// Request refused by an open circuit
    #[error("Circuit breaker error: {0}")]
    CircuitOpen(#[from] CircuitOpenError),

    /// Counter or circuit store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl ResilienceError {
    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RateLimit(e) if e.client_side => "RESILIENCE_RATE_LIMIT_CLIENT",
            Self::RateLimit(_) => "RESILIENCE_RATE_LIMIT",
            Self::CircuitOpen(_) => "RESILIENCE_CIRCUIT_OPEN",
            Self::Store(_) => "RESILIENCE_STORE",
            Self::Configuration(_) => "RESILIENCE_CONFIG",
        }
    }

    /// Check if waiting and trying again could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit(_) | Self::CircuitOpen(_) | Self::Store(StoreError::Pool { .. })
        )
    }

    /// Get retry-after duration if applicable
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit(e) => Some(e.retry_after),
            Self::CircuitOpen(e) => e.retry_after,
            _ => None,
        }
    }
}

/// A rate limit refused the request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Rate limit of {limit} exceeded, retry after {retry_after:?}")]
pub struct RateLimitExceeded {
    /// Configured number of requests per window
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// Suggested wait before the next attempt
    pub retry_after: Duration,
    /// Whether the refusal was decided locally rather than reported by the server
    pub client_side: bool,
}

impl RateLimitExceeded {
    /// Refusal decided by the local limiter
    pub fn client_side(limit: u32, retry_after: Duration) -> Self {
        Self {
            limit,
            remaining: 0,
            retry_after,
            client_side: true,
        }
    }

    /// Refusal reported by the remote service (e.g. a 429 response)
    pub fn from_server(limit: u32, remaining: u32, retry_after: Duration) -> Self {
        Self {
            limit,
            remaining,
            retry_after,
            client_side: false,
        }
    }
}

/// The circuit for a dependency refused the request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Circuit '{key}' rejected request: {message}")]
pub struct CircuitOpenError {
    /// Circuit key
    pub key: String,
    /// Reason for the refusal
    pub message: String,
    /// Time until the circuit admits a trial request, when known
    pub retry_after: Option<Duration>,
}

impl CircuitOpenError {
    /// Circuit is open and the reset timeout has not elapsed
    pub fn open(key: impl Into<String>, retry_after: Duration) -> Self {
        Self {
            key: key.into(),
            message: "circuit is open".to_string(),
            retry_after: Some(retry_after),
        }
    }

    /// Circuit is half-open and every trial slot is taken
    pub fn half_open_at_capacity(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: "half-open and at capacity".to_string(),
            retry_after: None,
        }
    }
}

/// Store errors
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Could not obtain a connection
    #[error("Pool error: {message}")]
    Pool {
        /// Error message
        message: String,
    },

    /// Query failed
    #[error("Query error: {message}")]
    Query {
        /// Error message
        message: String,
    },

    /// Schema setup failed
    #[error("Schema error: {message}")]
    Schema {
        /// Error message
        message: String,
    },
}

/// Configuration errors
#[derive(Error, Debug, Clone)]
pub enum ConfigurationError {
    /// A limit or threshold that must be positive was zero
    #[error("{field} must be greater than zero")]
    ZeroValue {
        /// Offending field
        field: &'static str,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Environment variable error
    #[error("Environment variable {name}: {message}")]
    EnvVar {
        /// Variable name
        name: String,
        /// Error message
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let client = ResilienceError::from(RateLimitExceeded::client_side(10, Duration::ZERO));
        assert_eq!(client.error_code(), "RESILIENCE_RATE_LIMIT_CLIENT");

        let server = ResilienceError::from(RateLimitExceeded::from_server(
            10,
            0,
            Duration::from_secs(1),
        ));
        assert_eq!(server.error_code(), "RESILIENCE_RATE_LIMIT");

        let circuit = ResilienceError::from(CircuitOpenError::half_open_at_capacity("svc"));
        assert_eq!(circuit.error_code(), "RESILIENCE_CIRCUIT_OPEN");
    }

    #[test]
    fn test_retry_after() {
        let err = ResilienceError::from(RateLimitExceeded::client_side(
            2,
            Duration::from_millis(1500),
        ));
        assert_eq!(err.retry_after(), Some(Duration::from_millis(1500)));

        let err = ResilienceError::from(CircuitOpenError::half_open_at_capacity("svc"));
        assert_eq!(err.retry_after(), None);

        let err = ResilienceError::from(ConfigurationError::ZeroValue { field: "limit" });
        assert_eq!(err.retry_after(), None);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_client_side_refusal_has_no_remaining() {
        let err = RateLimitExceeded::client_side(5, Duration::from_secs(2));
        assert_eq!(err.remaining, 0);
        assert!(err.client_side);
        assert_eq!(
            err.to_string(),
            "Rate limit of 5 exceeded, retry after 2s"
        );
    }

    #[test]
    fn test_circuit_open_message() {
        let err = CircuitOpenError::half_open_at_capacity("payments");
        assert_eq!(
            err.to_string(),
            "Circuit 'payments' rejected request: half-open and at capacity"
        );
    }
}
