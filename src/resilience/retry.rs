//! Retry decisions and backoff delays for failed attempts.
//!
//! The handler never sleeps on its own initiative and never raises a
//! "gave up" error: once the attempt cap is reached the decision methods
//! return `false` and the caller keeps whatever outcome it has.

use rand::Rng;
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::resolve::resolve_config;
use crate::types::{Call, Dependency, RetryableResponse};

/// Response predicate used when no policy or decider applies
pub type ResponsePredicate = Arc<dyn Fn(&dyn RetryableResponse) -> bool + Send + Sync>;

/// Retry policy supplying both the numbers and the decisions.
///
/// When a config names a policy, its numeric values replace the config's own.
pub trait RetryPolicy: Send + Sync {
    /// Total attempts allowed, the first one included
    fn times(&self) -> u32;

    /// Delay before the first retry
    fn delay(&self) -> Duration;

    /// Growth factor between retries
    fn multiplier(&self) -> f64;

    /// Upper bound on any delay
    fn max_delay(&self) -> Duration;

    /// Whether a response should be retried
    fn should_retry_response(&self, response: &dyn RetryableResponse, _attempt: u32) -> bool {
        response.is_server_error()
    }

    /// Whether an error should be retried
    fn should_retry_error(&self, _error: &(dyn Error + 'static), _attempt: u32) -> bool {
        false
    }
}

/// Decision-only retry strategy
pub trait RetryDecider: Send + Sync {
    /// Whether a response should be retried
    fn should_retry(&self, response: &dyn RetryableResponse, attempt: u32) -> bool;

    /// Whether an error should be retried; `None` defers to the config's error matchers
    fn should_retry_error(&self, _error: &(dyn Error + 'static), _attempt: u32) -> Option<bool> {
        None
    }
}

/// Policy given directly or by registered name
#[derive(Clone)]
pub enum PolicyRef {
    /// Policy object
    Instance(Arc<dyn RetryPolicy>),
    /// Name looked up in the [`RetryRegistry`]
    Named(String),
}

/// Decider given directly or by name.
///
/// A name is looked up in the [`RetryRegistry`] first, then as a retry method
/// on the call itself.
#[derive(Clone)]
pub enum DeciderRef {
    /// Decider object
    Instance(Arc<dyn RetryDecider>),
    /// Registered decider or call method name
    Named(String),
}

impl fmt::Debug for PolicyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(_) => f.write_str("Instance(..)"),
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

impl fmt::Debug for DeciderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(_) => f.write_str("Instance(..)"),
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

/// Matches an error type anywhere in an error's `source()` chain
#[derive(Clone, Copy)]
pub struct ErrorMatcher {
    name: &'static str,
    matches: fn(&(dyn Error + 'static)) -> bool,
}

impl ErrorMatcher {
    /// Matcher for errors of type `E`
    pub fn of<E: Error + 'static>() -> Self {
        Self {
            name: std::any::type_name::<E>(),
            matches: chain_contains::<E>,
        }
    }

    /// Type name being matched
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Check an error and its sources
    pub fn matches(&self, error: &(dyn Error + 'static)) -> bool {
        (self.matches)(error)
    }
}

impl fmt::Debug for ErrorMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ErrorMatcher").field(&self.name).finish()
    }
}

fn chain_contains<E: Error + 'static>(error: &(dyn Error + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if err.is::<E>() {
            return true;
        }
        current = err.source();
    }
    false
}

/// Configuration for retry behavior
#[derive(Clone)]
pub struct RetryConfig {
    /// Total attempts allowed, the first one included
    pub times: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Random spread applied to delays, as a fraction in `[0, 1]`
    pub jitter: f64,
    /// Status codes to retry; empty means "server errors"
    pub retryable_status_codes: BTreeSet<u16>,
    /// Error types to retry
    pub retryable_errors: Vec<ErrorMatcher>,
    /// Response predicate
    pub predicate: Option<ResponsePredicate>,
    /// Policy overriding numbers and decisions
    pub policy: Option<PolicyRef>,
    /// Decider overriding decisions
    pub decider: Option<DeciderRef>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            times: crate::DEFAULT_RETRY_TIMES,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.0,
            retryable_status_codes: BTreeSet::new(),
            retryable_errors: Vec::new(),
            predicate: None,
            policy: None,
            decider: None,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set total attempts
    pub fn times(mut self, n: u32) -> Self {
        self.times = n;
        self
    }

    /// Set initial delay
    pub fn delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set backoff multiplier
    pub fn multiplier(mut self, m: f64) -> Self {
        self.multiplier = m;
        self
    }

    /// Set maximum delay
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set jitter fraction, clamped to `[0, 1]`
    pub fn jitter(mut self, fraction: f64) -> Self {
        self.jitter = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        self
    }

    /// Retry these status codes
    pub fn retry_on_status(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes.extend(codes);
        self
    }

    /// Retry errors matched by `matcher`
    pub fn retry_on_error(mut self, matcher: ErrorMatcher) -> Self {
        self.retryable_errors.push(matcher);
        self
    }

    /// Retry responses accepted by `predicate`
    pub fn when(mut self, predicate: impl Fn(&dyn RetryableResponse) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Use a policy object
    pub fn policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.policy = Some(PolicyRef::Instance(Arc::new(policy)));
        self
    }

    /// Use a registered policy
    pub fn policy_named(mut self, name: impl Into<String>) -> Self {
        self.policy = Some(PolicyRef::Named(name.into()));
        self
    }

    /// Use a decider object
    pub fn decider(mut self, decider: impl RetryDecider + 'static) -> Self {
        self.decider = Some(DeciderRef::Instance(Arc::new(decider)));
        self
    }

    /// Use a registered decider or call method
    pub fn decider_named(mut self, name: impl Into<String>) -> Self {
        self.decider = Some(DeciderRef::Named(name.into()));
        self
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("times", &self.times)
            .field("base_delay", &self.base_delay)
            .field("multiplier", &self.multiplier)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .field("retryable_status_codes", &self.retryable_status_codes)
            .field("retryable_errors", &self.retryable_errors)
            .field("predicate", &self.predicate.is_some())
            .field("policy", &self.policy)
            .field("decider", &self.decider)
            .finish()
    }
}

/// Named policies and deciders
#[derive(Clone, Default)]
pub struct RetryRegistry {
    policies: HashMap<String, Arc<dyn RetryPolicy>>,
    deciders: HashMap<String, Arc<dyn RetryDecider>>,
}

impl RetryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a policy under `name`
    pub fn register_policy(&mut self, name: impl Into<String>, policy: impl RetryPolicy + 'static) {
        self.policies.insert(name.into(), Arc::new(policy));
    }

    /// Register a decider under `name`
    pub fn register_decider(&mut self, name: impl Into<String>, decider: impl RetryDecider + 'static) {
        self.deciders.insert(name.into(), Arc::new(decider));
    }

    /// Look up a policy
    pub fn policy(&self, name: &str) -> Option<Arc<dyn RetryPolicy>> {
        self.policies.get(name).cloned()
    }

    /// Look up a decider
    pub fn decider(&self, name: &str) -> Option<Arc<dyn RetryDecider>> {
        self.deciders.get(name).cloned()
    }
}

impl fmt::Debug for RetryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut policies: Vec<&String> = self.policies.keys().collect();
        let mut deciders: Vec<&String> = self.deciders.keys().collect();
        policies.sort();
        deciders.sort();
        f.debug_struct("RetryRegistry")
            .field("policies", &policies)
            .field("deciders", &deciders)
            .finish()
    }
}

/// Retry numbers after any policy override
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrySchedule {
    /// Total attempts allowed
    pub times: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Growth factor
    pub multiplier: f64,
    /// Upper bound on any delay
    pub max_delay: Duration,
}

impl RetrySchedule {
    /// `min(max_delay, base_delay * multiplier^(attempt - 1))`, truncated to whole milliseconds
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let raw = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }
}

/// Stateless retry handler
#[derive(Debug, Clone, Default)]
pub struct RetryHandler {
    registry: RetryRegistry,
}

impl RetryHandler {
    /// Create a handler with no named policies
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handler resolving names against `registry`
    pub fn with_registry(registry: RetryRegistry) -> Self {
        Self { registry }
    }

    /// Named policies and deciders
    pub fn registry(&self) -> &RetryRegistry {
        &self.registry
    }

    /// Effective retry config for a call
    pub fn config<'a>(&self, scope: &'a Dependency, call: &'a dyn Call) -> Option<&'a RetryConfig> {
        resolve_config(call.retry(), scope.retry())
    }

    /// Whether a response should be retried; `false` when no retry config applies
    pub fn should_retry_response(
        &self,
        scope: &Dependency,
        call: &dyn Call,
        response: &dyn RetryableResponse,
        attempt: u32,
    ) -> bool {
        self.config(scope, call)
            .is_some_and(|config| self.decide_response(config, call, response, attempt))
    }

    /// Whether an error should be retried; `false` when no retry config applies
    pub fn should_retry_error(
        &self,
        scope: &Dependency,
        call: &dyn Call,
        error: &(dyn Error + 'static),
        attempt: u32,
    ) -> bool {
        self.config(scope, call)
            .is_some_and(|config| self.decide_error(config, error, attempt))
    }

    /// Delay before retrying after `attempt`; zero when no retry config applies
    pub fn calculate_delay(&self, scope: &Dependency, call: &dyn Call, attempt: u32) -> Duration {
        self.config(scope, call)
            .map_or(Duration::ZERO, |config| self.delay_for(config, attempt))
    }

    /// Sleep for the computed delay and return it
    pub async fn sleep(&self, scope: &Dependency, call: &dyn Call, attempt: u32) -> Duration {
        let delay = self.calculate_delay(scope, call, attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        delay
    }

    /// Numbers in force for `config`
    pub fn schedule(&self, config: &RetryConfig) -> RetrySchedule {
        match self.resolve_policy(config) {
            Some(policy) => RetrySchedule {
                times: policy.times(),
                base_delay: policy.delay(),
                multiplier: policy.multiplier(),
                max_delay: policy.max_delay(),
            },
            None => RetrySchedule {
                times: config.times,
                base_delay: config.base_delay,
                multiplier: config.multiplier,
                max_delay: config.max_delay,
            },
        }
    }

    /// Response decision against an already resolved config
    pub fn decide_response(
        &self,
        config: &RetryConfig,
        call: &dyn Call,
        response: &dyn RetryableResponse,
        attempt: u32,
    ) -> bool {
        let policy = self.resolve_policy(config);
        let times = policy.as_ref().map_or(config.times, |p| p.times());
        if attempt >= times {
            debug!(attempt, times, "Retry attempts exhausted");
            return false;
        }

        if let Some(policy) = policy {
            return policy.should_retry_response(response, attempt);
        }

        match &config.decider {
            Some(DeciderRef::Instance(decider)) => return decider.should_retry(response, attempt),
            Some(DeciderRef::Named(name)) => {
                if let Some(decider) = self.registry.decider(name) {
                    return decider.should_retry(response, attempt);
                }
                if let Some(decision) = call.retry_method(name, response, attempt) {
                    return decision;
                }
                warn!(decider = %name, "Retry decider not found, falling back");
            }
            None => {}
        }

        if let Some(predicate) = &config.predicate {
            return predicate(response);
        }

        if !config.retryable_status_codes.is_empty() {
            return config.retryable_status_codes.contains(&response.status());
        }

        response.is_server_error()
    }

    /// Error decision against an already resolved config
    pub fn decide_error(&self, config: &RetryConfig, error: &(dyn Error + 'static), attempt: u32) -> bool {
        let policy = self.resolve_policy(config);
        let times = policy.as_ref().map_or(config.times, |p| p.times());
        if attempt >= times {
            debug!(attempt, times, "Retry attempts exhausted");
            return false;
        }

        if let Some(policy) = policy {
            return policy.should_retry_error(error, attempt);
        }

        let decider = match &config.decider {
            Some(DeciderRef::Instance(decider)) => Some(decider.clone()),
            Some(DeciderRef::Named(name)) => {
                let decider = self.registry.decider(name);
                if decider.is_none() {
                    warn!(decider = %name, "Retry decider not found, falling back");
                }
                decider
            }
            None => None,
        };
        if let Some(decision) = decider.and_then(|d| d.should_retry_error(error, attempt)) {
            return decision;
        }

        config.retryable_errors.iter().any(|matcher| matcher.matches(error))
    }

    /// Delay after `attempt` against an already resolved config, jitter applied
    pub fn delay_for(&self, config: &RetryConfig, attempt: u32) -> Duration {
        let schedule = self.schedule(config);
        let delay = schedule.delay(attempt);
        if config.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }

        let factor = rand::thread_rng().gen_range((1.0 - config.jitter)..=(1.0 + config.jitter));
        let jittered = (delay.as_millis() as f64 * factor).min(schedule.max_delay.as_millis() as f64);
        Duration::from_millis(jittered.max(0.0) as u64)
    }

    fn resolve_policy(&self, config: &RetryConfig) -> Option<Arc<dyn RetryPolicy>> {
        match config.policy.as_ref()? {
            PolicyRef::Instance(policy) => Some(policy.clone()),
            PolicyRef::Named(name) => {
                let policy = self.registry.policy(name);
                if policy.is_none() {
                    warn!(policy = %name, "Retry policy not found, using literal config");
                }
                policy
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CallSpec, StatusOnly};
    use pretty_assertions::assert_eq;
    use test_case::test_case;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("connection reset")]
    struct ConnectionReset;

    #[derive(Debug, Error)]
    #[error("request failed")]
    struct RequestFailed(#[source] ConnectionReset);

    #[derive(Debug, Error)]
    #[error("bad input")]
    struct BadInput;

    struct FixedPolicy;

    impl RetryPolicy for FixedPolicy {
        fn times(&self) -> u32 {
            2
        }
        fn delay(&self) -> Duration {
            Duration::from_millis(10)
        }
        fn multiplier(&self) -> f64 {
            1.0
        }
        fn max_delay(&self) -> Duration {
            Duration::from_millis(10)
        }
        fn should_retry_response(&self, response: &dyn RetryableResponse, _attempt: u32) -> bool {
            response.status() == 418
        }
    }

    struct TeapotDecider;

    impl RetryDecider for TeapotDecider {
        fn should_retry(&self, response: &dyn RetryableResponse, _attempt: u32) -> bool {
            response.status() == 418
        }
    }

    fn scoped(config: RetryConfig) -> (Dependency, CallSpec) {
        (Dependency::new("api").with_retry(config), CallSpec::new("get"))
    }

    #[test_case(1, 250 ; "first")]
    #[test_case(2, 375 ; "second")]
    #[test_case(3, 562 ; "third")]
    #[test_case(4, 843 ; "fourth")]
    fn test_delay_curve(attempt: u32, expected_ms: u64) {
        let handler = RetryHandler::new();
        let (scope, call) = scoped(
            RetryConfig::new()
                .times(5)
                .delay(Duration::from_millis(250))
                .multiplier(1.5)
                .max_delay(Duration::from_secs(10)),
        );

        assert_eq!(
            handler.calculate_delay(&scope, &call, attempt),
            Duration::from_millis(expected_ms)
        );
    }

    #[test]
    fn test_delay_capped_by_max() {
        let handler = RetryHandler::new();
        let (scope, call) = scoped(
            RetryConfig::new()
                .delay(Duration::from_secs(1))
                .max_delay(Duration::from_secs(5)),
        );

        assert_eq!(handler.calculate_delay(&scope, &call, 10), Duration::from_secs(5));
    }

    #[test]
    fn test_attempt_cap() {
        let handler = RetryHandler::new();
        let (scope, call) = scoped(RetryConfig::new().times(5));

        assert!(handler.should_retry_response(&scope, &call, &StatusOnly(503), 4));
        assert!(!handler.should_retry_response(&scope, &call, &StatusOnly(503), 5));
        assert!(!handler.should_retry_response(&scope, &call, &StatusOnly(503), 6));
    }

    #[test]
    fn test_no_config_never_retries() {
        let handler = RetryHandler::new();
        let scope = Dependency::new("api");
        let call = CallSpec::new("get");

        assert!(!handler.should_retry_response(&scope, &call, &StatusOnly(503), 1));
        assert_eq!(handler.calculate_delay(&scope, &call, 1), Duration::ZERO);
    }

    #[test]
    fn test_call_config_overrides_dependency() {
        let handler = RetryHandler::new();
        let scope = Dependency::new("api").with_retry(RetryConfig::new().times(10));
        let call = CallSpec::new("get").with_retry(RetryConfig::new().times(2));

        assert!(handler.should_retry_response(&scope, &call, &StatusOnly(503), 1));
        assert!(!handler.should_retry_response(&scope, &call, &StatusOnly(503), 2));
    }

    #[test_case(RetryConfig::new(), 503, true ; "default retries server errors")]
    #[test_case(RetryConfig::new(), 404, false ; "default skips client errors")]
    #[test_case(RetryConfig::new().retry_on_status([429]), 429, true ; "listed status")]
    #[test_case(RetryConfig::new().retry_on_status([429]), 503, false ; "unlisted server error")]
    #[test_case(RetryConfig::new().when(|r| r.status() == 409).retry_on_status([503]), 503, false ; "predicate before status codes")]
    #[test_case(RetryConfig::new().decider(TeapotDecider).when(|_| false), 418, true ; "decider before predicate")]
    #[test_case(RetryConfig::new().policy(FixedPolicy).decider(TeapotDecider), 503, false ; "policy before decider")]
    fn test_decision_precedence(config: RetryConfig, status: u16, expected: bool) {
        let handler = RetryHandler::new();
        let (scope, call) = scoped(config);

        assert_eq!(handler.should_retry_response(&scope, &call, &StatusOnly(status), 1), expected);
    }

    #[test]
    fn test_named_decider_from_registry() {
        let mut registry = RetryRegistry::new();
        registry.register_decider("teapot", TeapotDecider);
        let handler = RetryHandler::with_registry(registry);
        let (scope, call) = scoped(RetryConfig::new().decider_named("teapot"));

        assert!(handler.should_retry_response(&scope, &call, &StatusOnly(418), 1));
        assert!(!handler.should_retry_response(&scope, &call, &StatusOnly(503), 1));
    }

    #[test]
    fn test_named_decider_falls_back_to_call_method() {
        let handler = RetryHandler::new();
        let scope = Dependency::new("api").with_retry(RetryConfig::new().decider_named("only_conflicts"));
        let call = CallSpec::new("put").with_retry_method("only_conflicts", |r, _| r.status() == 409);

        assert!(handler.should_retry_response(&scope, &call, &StatusOnly(409), 1));
        assert!(!handler.should_retry_response(&scope, &call, &StatusOnly(503), 1));
    }

    #[test]
    fn test_unresolved_decider_falls_through() {
        let handler = RetryHandler::new();
        let (scope, call) = scoped(
            RetryConfig::new()
                .decider_named("missing")
                .retry_on_status([429]),
        );

        assert!(handler.should_retry_response(&scope, &call, &StatusOnly(429), 1));
        assert!(!handler.should_retry_response(&scope, &call, &StatusOnly(503), 1));
    }

    #[test]
    fn test_policy_numbers_override_config() {
        let mut registry = RetryRegistry::new();
        registry.register_policy("fixed", FixedPolicy);
        let handler = RetryHandler::with_registry(registry);
        let (scope, call) = scoped(
            RetryConfig::new()
                .times(10)
                .delay(Duration::from_secs(3))
                .policy_named("fixed"),
        );

        assert_eq!(handler.calculate_delay(&scope, &call, 3), Duration::from_millis(10));
        assert!(handler.should_retry_response(&scope, &call, &StatusOnly(418), 1));
        assert!(!handler.should_retry_response(&scope, &call, &StatusOnly(418), 2));
    }

    #[test]
    fn test_unresolved_policy_uses_literal_config() {
        let handler = RetryHandler::new();
        let config = RetryConfig::new()
            .times(4)
            .delay(Duration::from_millis(100))
            .policy_named("missing");

        assert_eq!(
            handler.schedule(&config),
            RetrySchedule {
                times: 4,
                base_delay: Duration::from_millis(100),
                multiplier: 2.0,
                max_delay: Duration::from_secs(30),
            }
        );
        let (scope, call) = scoped(config);
        assert!(handler.should_retry_response(&scope, &call, &StatusOnly(503), 3));
    }

    #[test]
    fn test_error_matching_walks_sources() {
        let handler = RetryHandler::new();
        let (scope, call) = scoped(RetryConfig::new().retry_on_error(ErrorMatcher::of::<ConnectionReset>()));

        assert!(handler.should_retry_error(&scope, &call, &ConnectionReset, 1));
        assert!(handler.should_retry_error(&scope, &call, &RequestFailed(ConnectionReset), 1));
        assert!(!handler.should_retry_error(&scope, &call, &BadInput, 1));
        assert!(!handler.should_retry_error(&scope, &call, &ConnectionReset, 3));
    }

    #[test]
    fn test_unresolved_decider_falls_through_for_errors() {
        let handler = RetryHandler::new();
        let (scope, call) = scoped(
            RetryConfig::new()
                .decider_named("missing")
                .retry_on_error(ErrorMatcher::of::<ConnectionReset>()),
        );

        assert!(handler.should_retry_error(&scope, &call, &ConnectionReset, 1));
        assert!(!handler.should_retry_error(&scope, &call, &BadInput, 1));
    }

    #[test]
    fn test_unknown_errors_not_retried_by_default() {
        let handler = RetryHandler::new();
        let (scope, call) = scoped(RetryConfig::new());

        assert!(!handler.should_retry_error(&scope, &call, &ConnectionReset, 1));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let handler = RetryHandler::new();
        let config = RetryConfig::new()
            .delay(Duration::from_millis(1000))
            .multiplier(1.0)
            .jitter(0.25);

        for _ in 0..50 {
            let delay = handler.delay_for(&config, 1).as_millis();
            assert!((750..=1250).contains(&delay), "delay {delay} out of range");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_waits_computed_delay() {
        let handler = RetryHandler::new();
        let (scope, call) = scoped(RetryConfig::new().delay(Duration::from_millis(200)));

        let start = tokio::time::Instant::now();
        let slept = handler.sleep(&scope, &call, 2).await;

        assert_eq!(slept, Duration::from_millis(400));
        assert!(start.elapsed() >= Duration::from_millis(400));
    }
}
