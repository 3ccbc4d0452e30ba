//! Call model: the in-flight request and the dependency it targets.
//!
//! Configuration is attached to calls and dependencies when they are built,
//! never discovered at send time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::resilience::{CircuitBreakerConfig, RateLimitConfig, RetryConfig};
use crate::types::RetryableResponse;

/// An outbound request attempt as seen by the resilience layer.
///
/// Every declaration is optional; an absent declaration defers to the
/// dependency default.
pub trait Call: Send + Sync {
    /// Rate limit declared for this call
    fn rate_limit(&self) -> Option<&RateLimitConfig> {
        None
    }

    /// Circuit breaker declared for this call
    fn circuit_breaker(&self) -> Option<&CircuitBreakerConfig> {
        None
    }

    /// Retry behaviour declared for this call
    fn retry(&self) -> Option<&RetryConfig> {
        None
    }

    /// Public field lookup used by `{field}` key templates
    fn field(&self, _name: &str) -> Option<String> {
        None
    }

    /// Invoke a retry decision method by name.
    ///
    /// Returns `None` when the call has no method with that name.
    fn retry_method(
        &self,
        _name: &str,
        _response: &dyn RetryableResponse,
        _attempt: u32,
    ) -> Option<bool> {
        None
    }
}

/// Retry decision method registered on a [`CallSpec`]
pub type RetryMethod = Arc<dyn Fn(&dyn RetryableResponse, u32) -> bool + Send + Sync>;

/// The dependency (connector) a call is sent through.
///
/// Its name is the default rate limit and circuit key; its configs apply to
/// every call that does not declare its own.
#[derive(Debug, Clone)]
pub struct Dependency {
    name: String,
    rate_limit: Option<RateLimitConfig>,
    circuit_breaker: Option<CircuitBreakerConfig>,
    retry: Option<RetryConfig>,
}

impl Dependency {
    /// Create a dependency with no defaults
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rate_limit: None,
            circuit_breaker: None,
            retry: None,
        }
    }

    /// Set the default rate limit
    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    /// Set the default circuit breaker
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    /// Set the default retry behaviour
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Identity used as the default key
    pub fn identity(&self) -> &str {
        &self.name
    }

    /// Default rate limit
    pub fn rate_limit(&self) -> Option<&RateLimitConfig> {
        self.rate_limit.as_ref()
    }

    /// Default circuit breaker
    pub fn circuit_breaker(&self) -> Option<&CircuitBreakerConfig> {
        self.circuit_breaker.as_ref()
    }

    /// Default retry behaviour
    pub fn retry(&self) -> Option<&RetryConfig> {
        self.retry.as_ref()
    }
}

/// A concrete call built up front with its declarations and template fields.
#[derive(Clone, Default)]
pub struct CallSpec {
    name: String,
    fields: HashMap<String, String>,
    rate_limit: Option<RateLimitConfig>,
    circuit_breaker: Option<CircuitBreakerConfig>,
    retry: Option<RetryConfig>,
    methods: HashMap<String, RetryMethod>,
}

impl CallSpec {
    /// Create a call with a descriptive name (used in logs only)
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Name of the call
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expose a field to key templates
    pub fn with_field(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.fields.insert(name.into(), value.to_string());
        self
    }

    /// Declare a rate limit
    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    /// Declare a circuit breaker
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    /// Declare retry behaviour
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Register a named retry decision method
    pub fn with_retry_method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&dyn RetryableResponse, u32) -> bool + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }
}

impl Call for CallSpec {
    fn rate_limit(&self) -> Option<&RateLimitConfig> {
        self.rate_limit.as_ref()
    }

    fn circuit_breaker(&self) -> Option<&CircuitBreakerConfig> {
        self.circuit_breaker.as_ref()
    }

    fn retry(&self) -> Option<&RetryConfig> {
        self.retry.as_ref()
    }

    fn field(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }

    fn retry_method(
        &self,
        name: &str,
        response: &dyn RetryableResponse,
        attempt: u32,
    ) -> Option<bool> {
        self.methods.get(name).map(|method| method(response, attempt))
    }
}

impl fmt::Debug for CallSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&String> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("CallSpec")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("rate_limit", &self.rate_limit)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("retry", &self.retry)
            .field("methods", &methods)
            .finish()
    }
}
