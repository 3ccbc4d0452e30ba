//! HTTP Resilience
//!
//! Client-side resilience for outbound HTTP calls:
//! - Fixed-window rate limiting over a pluggable counter store (in-memory or Postgres)
//! - Per-key circuit breakers with lazy half-open probation
//! - Retry decisions with policies, deciders, predicates and capped exponential backoff
//! - An orchestrator running all three around one logical request
//!
//! Configuration is declared on the call or on the dependency it targets; a
//! call's declaration always wins over the dependency default, and a missing
//! declaration disables the feature.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use http_resilience::{
//!     CallSpec, CircuitBreakerConfig, Dependency, RateLimitConfig, ResilienceOrchestrator,
//!     RetryConfig, StatusOnly,
//! };
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let billing = Dependency::new("billing-api")
//!         .with_rate_limit(RateLimitConfig::per_second(10))
//!         .with_circuit_breaker(CircuitBreakerConfig::new().failure_threshold(5))
//!         .with_retry(RetryConfig::new().times(3).delay(Duration::from_millis(250)));
//!     let call = CallSpec::new("list-invoices");
//!
//!     let orchestrator = ResilienceOrchestrator::new();
//!     let response = orchestrator
//!         .execute(&billing, &call, || async { Ok::<_, std::io::Error>(StatusOnly(200)) })
//!         .await?;
//!
//!     println!("status {}", response.0);
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `postgres` (default) - Postgres-backed counter store shared across processes

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;
pub mod types;

// Resilience
pub mod resilience;

// Observability
pub mod observability;

// Testing utilities
pub mod mocks;

// Tests
#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use clock::{Clock, MockClock, SystemClock};
pub use config::ResilienceSettings;
pub use errors::{
    CircuitOpenError, ConfigurationError, RateLimitExceeded, ResilienceError, ResilienceResult,
    StoreError,
};
pub use resilience::{
    Backoff, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
    CounterStore, ExecuteError, RateLimitConfig, RateLimiter, ResilienceOrchestrator, RetryConfig,
    RetryHandler,
};
pub use types::{Call, CallSpec, Dependency, RetryableResponse, StatusOnly};

/// Default rate limit window in seconds
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Default circuit reset timeout in seconds
pub const DEFAULT_RESET_TIMEOUT_SECS: u64 = 30;

/// Default total retry attempts
pub const DEFAULT_RETRY_TIMES: u32 = 3;
