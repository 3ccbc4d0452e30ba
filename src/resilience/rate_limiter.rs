//! Client-side fixed-window rate limiting.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::backoff::Backoff;
use super::resolve::{resolve_config, resolve_key, KeyTemplate};
use super::retry::{ErrorMatcher, RetryConfig};
use super::store::{CounterStore, MemoryCounterStore};
use crate::clock::Clock;
use crate::errors::{ConfigurationError, RateLimitExceeded, ResilienceResult};
use crate::observability::redact_key;
use crate::types::{Call, Dependency, RetryableResponse};

/// Configuration for a rate limit
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests admitted per window
    pub requests: u32,
    /// Window length
    pub per: Duration,
    /// Whether refused calls should be retried
    pub retry: bool,
    /// Retries allowed after a refusal, when `retry` is set
    pub max_retries: u32,
    /// Backoff used to compute `retry_after`
    pub backoff: Backoff,
    /// Key template; the dependency identity when absent
    pub key: Option<KeyTemplate>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 60,
            per: Duration::from_secs(crate::DEFAULT_RATE_LIMIT_WINDOW_SECS),
            retry: false,
            max_retries: 3,
            backoff: Backoff::default(),
            key: None,
        }
    }
}

impl RateLimitConfig {
    /// `requests` per `per`
    pub fn new(requests: u32, per: Duration) -> Self {
        Self {
            requests,
            per,
            ..Default::default()
        }
    }

    /// `requests` per second
    pub fn per_second(requests: u32) -> Self {
        Self::new(requests, Duration::from_secs(1))
    }

    /// `requests` per minute
    pub fn per_minute(requests: u32) -> Self {
        Self::new(requests, Duration::from_secs(60))
    }

    /// Enable or disable retrying refused calls
    pub fn retry(mut self, enabled: bool) -> Self {
        self.retry = enabled;
        self
    }

    /// Set maximum retries
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set backoff strategy
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set key template
    pub fn key(mut self, template: impl Into<KeyTemplate>) -> Self {
        self.key = Some(template.into());
        self
    }

    /// Check limits are usable
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.requests == 0 {
            return Err(ConfigurationError::ZeroValue { field: "requests" });
        }
        if self.per.is_zero() {
            return Err(ConfigurationError::ZeroValue { field: "per" });
        }
        Ok(())
    }
}

/// Snapshot of a rate limit for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitState {
    /// Requests admitted per window
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// When the current window closes, if one is open
    pub reset: Option<DateTime<Utc>>,
}

/// Rate limiter deciding admission against a [`CounterStore`]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter over the given store
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create a rate limiter with a process-local store
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(MemoryCounterStore::with_clock(clock.clone()));
        Self::new(store, clock)
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Effective rate limit for a call
    pub fn config<'a>(scope: &'a Dependency, call: &'a dyn Call) -> Option<&'a RateLimitConfig> {
        resolve_config(call.rate_limit(), scope.rate_limit())
    }

    /// Admit the call or refuse it with [`RateLimitExceeded`].
    ///
    /// Calls with no resolved rate limit are always admitted.
    pub async fn check(&self, scope: &Dependency, call: &dyn Call) -> ResilienceResult<()> {
        let Some(config) = Self::config(scope, call) else {
            return Ok(());
        };
        let key = resolve_key(config.key.as_ref(), scope, call);

        let count = self.store.increment(&key, config.per).await?;
        if count <= config.requests {
            debug!(key = %redact_key(&key), limit = config.requests, count, "Rate limit admitted request");
            return Ok(());
        }

        let attempt = count - config.requests;
        let retry_after = self.calculate_backoff(call, config, attempt, None);

        warn!(
            key = %redact_key(&key),
            limit = config.requests,
            attempt,
            retry_after_ms = retry_after.as_millis() as u64,
            "Client-side rate limit exceeded"
        );

        Err(RateLimitExceeded::client_side(config.requests, retry_after).into())
    }

    /// Current limit, remaining requests and reset time; `None` when no rate limit applies
    pub async fn state(
        &self,
        scope: &Dependency,
        call: &dyn Call,
    ) -> ResilienceResult<Option<RateLimitState>> {
        let Some(config) = Self::config(scope, call) else {
            return Ok(None);
        };
        let key = resolve_key(config.key.as_ref(), scope, call);

        Ok(Some(RateLimitState {
            limit: config.requests,
            remaining: self.store.remaining(&key, config.requests).await?,
            reset: self.store.reset_time(&key).await?,
        }))
    }

    /// Delay before `attempt` under the configured backoff
    pub fn calculate_backoff(
        &self,
        call: &dyn Call,
        config: &RateLimitConfig,
        attempt: u32,
        retry_after_hint: Option<Duration>,
    ) -> Duration {
        config.backoff.delay(call, attempt, retry_after_hint)
    }

    /// Server-supplied wait time carried by a response, if any
    pub fn retry_after_hint(&self, response: &dyn RetryableResponse) -> Option<Duration> {
        let now = self.clock.now();
        response
            .rate_limit_headers(now)
            .and_then(|headers| headers.retry_after_hint(now))
    }

    /// Retry behaviour implied by the rate limit, when it enables retries.
    ///
    /// Allows `max_retries` retries after the first attempt, on 429 responses
    /// and client-side refusals.
    pub fn retry_config(scope: &Dependency, call: &dyn Call) -> Option<RetryConfig> {
        let config = Self::config(scope, call).filter(|config| config.retry)?;

        Some(
            RetryConfig::new()
                .times(config.max_retries.saturating_add(1))
                .delay(config.backoff.base().unwrap_or(Duration::from_secs(1)))
                .multiplier(config.backoff.multiplier())
                .retry_on_status([429])
                .retry_on_error(ErrorMatcher::of::<RateLimitExceeded>()),
        )
    }

    /// Forget the current window for the call's key
    pub async fn reset(&self, scope: &Dependency, call: &dyn Call) -> ResilienceResult<()> {
        if let Some(config) = Self::config(scope, call) {
            let key = resolve_key(config.key.as_ref(), scope, call);
            self.store.reset(&key).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}
