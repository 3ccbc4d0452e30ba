//! Resilience orchestrator combining rate limiting, circuit breaking and retry.

use std::error::Error;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry};
use super::circuit_store::{CircuitStore, MemoryCircuitStore};
use super::rate_limiter::RateLimiter;
use super::retry::{RetryConfig, RetryHandler, RetryRegistry};
use super::store::{CounterStore, MemoryCounterStore};
use crate::clock::{Clock, SystemClock};
use crate::errors::ResilienceError;
use crate::types::{Call, Dependency, RetryableResponse};

/// Outcome of [`ResilienceOrchestrator::execute`] when no response is returned
#[derive(Error, Debug)]
pub enum ExecuteError<E> {
    /// Refused before sending, or a store failed
    #[error(transparent)]
    Resilience(#[from] ResilienceError),

    /// The operation itself failed and was not (or no longer) retried
    #[error("Transport error: {0}")]
    Transport(#[source] E),
}

impl<E> ExecuteError<E> {
    /// Resilience error, if this is one
    pub fn resilience(&self) -> Option<&ResilienceError> {
        match self {
            Self::Resilience(e) => Some(e),
            Self::Transport(_) => None,
        }
    }

    /// Operation error, if this is one
    pub fn into_transport(self) -> Option<E> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Resilience(_) => None,
        }
    }
}

/// Builder for [`ResilienceOrchestrator`]
#[derive(Default)]
pub struct ResilienceOrchestratorBuilder {
    clock: Option<Arc<dyn Clock>>,
    counter_store: Option<Arc<dyn CounterStore>>,
    circuit_store: Option<Arc<dyn CircuitStore>>,
    registry: RetryRegistry,
}

impl ResilienceOrchestratorBuilder {
    /// Set the clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the rate limit counter store
    pub fn counter_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.counter_store = Some(store);
        self
    }

    /// Set the circuit store
    pub fn circuit_store(mut self, store: Arc<dyn CircuitStore>) -> Self {
        self.circuit_store = Some(store);
        self
    }

    /// Set the registry of named retry policies and deciders
    pub fn retry_registry(mut self, registry: RetryRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Build the orchestrator; unset stores are process-local
    pub fn build(self) -> ResilienceOrchestrator {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let counter_store = self
            .counter_store
            .unwrap_or_else(|| Arc::new(MemoryCounterStore::with_clock(clock.clone())));
        let circuit_store = self
            .circuit_store
            .unwrap_or_else(|| Arc::new(MemoryCircuitStore::new()));

        ResilienceOrchestrator {
            rate_limiter: RateLimiter::new(counter_store, clock.clone()),
            circuits: CircuitBreakerRegistry::new(circuit_store, clock),
            retry: RetryHandler::with_registry(self.registry),
        }
    }
}

/// Orchestrator for combining resilience patterns
pub struct ResilienceOrchestrator {
    rate_limiter: RateLimiter,
    circuits: CircuitBreakerRegistry,
    retry: RetryHandler,
}

impl ResilienceOrchestrator {
    /// Create an orchestrator with process-local stores and the system clock
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building an orchestrator
    pub fn builder() -> ResilienceOrchestratorBuilder {
        ResilienceOrchestratorBuilder::default()
    }

    /// Rate limiter
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Circuit breakers
    pub fn circuits(&self) -> &CircuitBreakerRegistry {
        &self.circuits
    }

    /// Retry handler
    pub fn retry(&self) -> &RetryHandler {
        &self.retry
    }

    /// Execute an operation with all resilience patterns applied.
    ///
    /// Each attempt passes the rate limiter and the circuit breaker before
    /// `operation` runs. 5xx responses and operation errors count as circuit
    /// failures. Retries follow the call's retry config, or the config implied
    /// by a rate limit with retries enabled. The last response is returned as
    /// is once retries stop, whatever its status.
    #[instrument(skip(self, scope, call, operation), fields(dependency = %scope.identity()))]
    pub async fn execute<F, Fut, R, E>(
        &self,
        scope: &Dependency,
        call: &dyn Call,
        mut operation: F,
    ) -> Result<R, ExecuteError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, E>>,
        R: RetryableResponse,
        E: Error + 'static,
    {
        let retry_config = self
            .retry
            .config(scope, call)
            .cloned()
            .or_else(|| RateLimiter::retry_config(scope, call));
        let refusal_budget = RateLimiter::config(scope, call)
            .filter(|config| config.retry)
            .map_or(0, |config| config.max_retries);
        let breaker = self.circuits.breaker(scope, call);

        let mut attempt = 0u32;
        let mut refusals = 0u32;

        loop {
            if let Err(err) = self.rate_limiter.check(scope, call).await {
                let wait = match &err {
                    ResilienceError::RateLimit(exceeded) if refusals < refusal_budget => {
                        Some(exceeded.retry_after)
                    }
                    _ => None,
                };
                let Some(wait) = wait else {
                    return Err(err.into());
                };

                refusals += 1;
                debug!(
                    refusals,
                    delay_ms = wait.as_millis() as u64,
                    "Waiting out client-side rate limit"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if let Some(breaker) = &breaker {
                breaker.allow_request().map_err(ResilienceError::from)?;
            }

            attempt += 1;
            let result = operation().await;
            record_outcome(breaker.as_ref(), &result);

            let Some(config) = &retry_config else {
                return result.map_err(ExecuteError::Transport);
            };

            let retry_delay = match &result {
                Ok(response) => self
                    .retry
                    .decide_response(config, call, response, attempt)
                    .then(|| self.response_delay(scope, call, config, response, attempt)),
                Err(error) => self
                    .retry
                    .decide_error(config, error, attempt)
                    .then(|| self.retry.delay_for(config, attempt)),
            };
            let Some(delay) = retry_delay else {
                return result.map_err(ExecuteError::Transport);
            };

            match &result {
                Ok(response) => debug!(
                    attempt,
                    status = response.status(),
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after response"
                ),
                Err(error) => warn!(
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after error"
                ),
            }
            tokio::time::sleep(delay).await;
        }
    }

    /// 429s back off per the rate limit config, never sooner than the server asked
    fn response_delay(
        &self,
        scope: &Dependency,
        call: &dyn Call,
        config: &RetryConfig,
        response: &dyn RetryableResponse,
        attempt: u32,
    ) -> Duration {
        let computed = self.retry.delay_for(config, attempt);
        if response.status() != 429 {
            return computed;
        }

        let hint = self.rate_limiter.retry_after_hint(response);
        let backoff = RateLimiter::config(scope, call)
            .filter(|limit| limit.retry)
            .map_or(computed, |limit| {
                self.rate_limiter.calculate_backoff(call, limit, attempt, hint)
            });

        hint.map_or(backoff, |hint| backoff.max(hint))
    }
}

impl Default for ResilienceOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResilienceOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceOrchestrator")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn record_outcome<R: RetryableResponse, E>(breaker: Option<&CircuitBreaker>, result: &Result<R, E>) {
    let Some(breaker) = breaker else {
        return;
    };
    match result {
        Ok(response) if !response.is_server_error() => breaker.record_success(),
        _ => breaker.record_failure(),
    }
}
