//! Resilience patterns for outbound HTTP calls.
//!
//! Provides client-side rate limiting, circuit breaking and retry decisions,
//! plus an orchestrator that runs them around a single logical request.

pub mod backoff;
pub mod circuit_breaker;
pub mod circuit_store;
pub mod orchestrator;
pub mod rate_limiter;
pub mod resolve;
pub mod retry;
pub mod store;

pub use backoff::{Backoff, BackoffPolicy, RetryAfterBackoff};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitHook, CircuitHooks,
};
pub use circuit_store::{CircuitRecord, CircuitState, CircuitStore, MemoryCircuitStore};
pub use orchestrator::{ExecuteError, ResilienceOrchestrator, ResilienceOrchestratorBuilder};
pub use rate_limiter::{RateLimitConfig, RateLimitState, RateLimiter};
pub use resolve::{resolve_config, resolve_key, KeyTemplate};
pub use retry::{
    DeciderRef, ErrorMatcher, PolicyRef, ResponsePredicate, RetryConfig, RetryDecider,
    RetryHandler, RetryPolicy, RetryRegistry, RetrySchedule,
};
pub use store::{CounterStore, MemoryCounterStore, RateLimitBucket};
#[cfg(feature = "postgres")]
pub use store::{PostgresCounterStore, PostgresStoreConfig};
