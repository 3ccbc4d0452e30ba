//! Circuit breaker pattern for fault tolerance.
//!
//! State lives in a [`CircuitStore`] keyed by circuit key, so every handle
//! built for the same key shares one circuit. The `Open -> HalfOpen` move is
//! made lazily by whichever query first observes the elapsed reset timeout;
//! it happens inside the store's atomic update so only one caller sees it.
//! A closed circuit with nothing counted holds no record at all.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::circuit_store::{CircuitRecord, CircuitState, CircuitStore, MemoryCircuitStore};
use super::resolve::{resolve_config, resolve_key, KeyTemplate};
use crate::clock::{elapsed_between, Clock};
use crate::errors::{CircuitOpenError, ConfigurationError};
use crate::observability::redact_key;
use crate::types::{Call, Dependency};

/// Callback receiving the circuit key
pub type CircuitHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Side effects run on state transitions
#[derive(Clone, Default)]
pub struct CircuitHooks {
    /// Called when the circuit opens
    pub on_open: Option<CircuitHook>,
    /// Called when the circuit closes after probation
    pub on_close: Option<CircuitHook>,
    /// Called when the circuit enters probation
    pub on_half_open: Option<CircuitHook>,
}

impl fmt::Debug for CircuitHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitHooks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .finish()
    }
}

/// Configuration for circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening circuit
    pub failure_threshold: u32,
    /// How long to stay open before admitting trial requests
    pub reset_timeout: Duration,
    /// Maximum trial requests in flight while half-open
    pub half_open_requests: u32,
    /// Failures older than this stop counting toward the threshold
    pub failure_window: Option<Duration>,
    /// Number of successes in half-open to close circuit
    pub success_threshold: u32,
    /// Key template; the dependency identity when absent
    pub key: Option<KeyTemplate>,
    /// Transition hooks
    pub hooks: CircuitHooks,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(crate::DEFAULT_RESET_TIMEOUT_SECS),
            half_open_requests: 3,
            failure_window: None,
            success_threshold: 3,
            key: None,
            hooks: CircuitHooks::default(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set failure threshold
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    /// Set reset timeout
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Set half-open trial capacity
    pub fn half_open_requests(mut self, n: u32) -> Self {
        self.half_open_requests = n;
        self
    }

    /// Set failure window
    pub fn failure_window(mut self, window: Duration) -> Self {
        self.failure_window = Some(window);
        self
    }

    /// Set success threshold
    pub fn success_threshold(mut self, n: u32) -> Self {
        self.success_threshold = n;
        self
    }

    /// Set key template
    pub fn key(mut self, template: impl Into<KeyTemplate>) -> Self {
        self.key = Some(template.into());
        self
    }

    /// Run `hook` when the circuit opens
    pub fn on_open(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.hooks.on_open = Some(Arc::new(hook));
        self
    }

    /// Run `hook` when the circuit closes
    pub fn on_close(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.hooks.on_close = Some(Arc::new(hook));
        self
    }

    /// Run `hook` when the circuit becomes half-open
    pub fn on_half_open(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.hooks.on_half_open = Some(Arc::new(hook));
        self
    }

    /// Check thresholds are usable
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.failure_threshold == 0 {
            return Err(ConfigurationError::ZeroValue {
                field: "failure_threshold",
            });
        }
        if self.success_threshold == 0 {
            return Err(ConfigurationError::ZeroValue {
                field: "success_threshold",
            });
        }
        if self.half_open_requests == 0 {
            return Err(ConfigurationError::ZeroValue {
                field: "half_open_requests",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Opened,
    Closed,
    HalfOpened,
}

/// Handle on one circuit
#[derive(Clone)]
pub struct CircuitBreaker {
    key: String,
    config: CircuitBreakerConfig,
    store: Arc<dyn CircuitStore>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Create a handle for `key`
    pub fn new(
        key: impl Into<String>,
        config: CircuitBreakerConfig,
        store: Arc<dyn CircuitStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            key: key.into(),
            config,
            store,
            clock,
        }
    }

    /// Circuit key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Configuration in force
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current circuit state
    pub fn state(&self) -> CircuitState {
        let now = self.clock.now();
        let mut state = CircuitState::Closed;
        let mut transition = None;

        self.store.update(&self.key, &mut |slot| {
            if let Some(record) = slot {
                transition = self.promote_if_due(record, now);
                state = record.state;
            }
        });

        self.fire(transition);
        state
    }

    /// Stored record; a key never seen reads as a fresh closed circuit
    pub fn snapshot(&self) -> CircuitRecord {
        self.store.load(&self.key).unwrap_or_default()
    }

    /// Admit a request or refuse it with [`CircuitOpenError`]
    pub fn allow_request(&self) -> Result<(), CircuitOpenError> {
        let now = self.clock.now();
        let mut outcome = Ok(());
        let mut transition = None;

        self.store.update(&self.key, &mut |slot| {
            let Some(record) = slot else {
                outcome = Ok(());
                return;
            };
            transition = self.promote_if_due(record, now);

            outcome = match record.state {
                CircuitState::Closed => Ok(()),
                CircuitState::Open => Err(CircuitOpenError::open(
                    self.key.clone(),
                    self.remaining_timeout(record, now),
                )),
                CircuitState::HalfOpen => {
                    self.release_stale_trials(record, now);
                    if record.half_open_attempts < self.config.half_open_requests {
                        record.half_open_attempts += 1;
                        record.trial_admitted_at = Some(now);
                        Ok(())
                    } else {
                        Err(CircuitOpenError::half_open_at_capacity(self.key.clone()))
                    }
                }
            };
        });

        self.fire(transition);

        if let Err(err) = &outcome {
            debug!(
                key = %redact_key(&self.key),
                reason = %err.message,
                "Circuit breaker rejected request"
            );
        }
        outcome
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        let mut transition = None;

        self.store.update(&self.key, &mut |slot| {
            let Some(record) = slot.as_mut() else {
                return;
            };
            if record.state != CircuitState::HalfOpen {
                return;
            }

            record.success_count += 1;
            record.half_open_attempts = record.half_open_attempts.saturating_sub(1);

            if record.success_count >= self.config.success_threshold {
                transition = Some(Transition::Closed);
                *slot = None;
            }
        });

        self.fire(transition);
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut transition = None;

        self.store.update(&self.key, &mut |slot| {
            let record = slot.get_or_insert_with(CircuitRecord::default);

            match record.state {
                CircuitState::Closed => {
                    self.roll_failure_window(record, now);
                    record.failure_count += 1;

                    if record.failure_count >= self.config.failure_threshold {
                        Self::trip(record, now);
                        transition = Some(Transition::Opened);
                    }
                }
                CircuitState::HalfOpen => {
                    Self::trip(record, now);
                    transition = Some(Transition::Opened);
                }
                CircuitState::Open => {}
            }
        });

        self.fire(transition);
    }

    /// Record an outcome: `Ok` counts as success, `Err` as failure
    pub fn record<T, E>(&self, result: &Result<T, E>) {
        match result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
    }

    /// Force the circuit open
    pub fn open(&self) {
        let now = self.clock.now();
        let mut transition = None;

        self.store.update(&self.key, &mut |slot| {
            let record = slot.get_or_insert_with(CircuitRecord::default);
            if record.state != CircuitState::Open {
                transition = Some(Transition::Opened);
            }
            Self::trip(record, now);
        });

        self.fire(transition);
    }

    /// Force the circuit closed
    pub fn close(&self) {
        let mut transition = None;

        self.store.update(&self.key, &mut |slot| {
            if slot.as_ref().is_some_and(|record| record.state != CircuitState::Closed) {
                transition = Some(Transition::Closed);
            }
            *slot = None;
        });

        self.fire(transition);
    }

    /// Reset the circuit breaker to closed state with zeroed counters
    pub fn reset(&self) {
        self.store.update(&self.key, &mut |slot| *slot = None);
        debug!(key = %redact_key(&self.key), "Circuit breaker reset to CLOSED");
    }

    /// Time until an open circuit admits a trial request
    pub fn retry_after(&self) -> Option<Duration> {
        let record = self.store.load(&self.key)?;
        (record.state == CircuitState::Open).then(|| self.remaining_timeout(&record, self.clock.now()))
    }

    fn promote_if_due(&self, record: &mut CircuitRecord, now: DateTime<Utc>) -> Option<Transition> {
        if record.state != CircuitState::Open {
            return None;
        }
        let due = record
            .opened_at
            .is_some_and(|opened| elapsed_between(opened, now) >= self.config.reset_timeout);
        if !due {
            return None;
        }

        record.state = CircuitState::HalfOpen;
        record.success_count = 0;
        record.half_open_attempts = 0;
        record.trial_admitted_at = None;
        Some(Transition::HalfOpened)
    }

    /// Trial slots whose outcome was never recorded within `reset_timeout` are handed back
    fn release_stale_trials(&self, record: &mut CircuitRecord, now: DateTime<Utc>) {
        let stale = record
            .trial_admitted_at
            .is_some_and(|admitted| elapsed_between(admitted, now) >= self.config.reset_timeout);
        if stale && record.half_open_attempts > 0 {
            debug!(
                key = %redact_key(&self.key),
                released = record.half_open_attempts,
                "Releasing unrecorded half-open trial slots"
            );
            record.half_open_attempts = 0;
            record.trial_admitted_at = None;
        }
    }

    fn remaining_timeout(&self, record: &CircuitRecord, now: DateTime<Utc>) -> Duration {
        match record.opened_at {
            Some(opened) => self
                .config
                .reset_timeout
                .saturating_sub(elapsed_between(opened, now)),
            None => self.config.reset_timeout,
        }
    }

    fn roll_failure_window(&self, record: &mut CircuitRecord, now: DateTime<Utc>) {
        let expired = match (self.config.failure_window, record.window_started_at) {
            (Some(window), Some(started)) => elapsed_between(started, now) >= window,
            _ => false,
        };
        if expired {
            record.failure_count = 0;
        }
        if expired || record.failure_count == 0 {
            record.window_started_at = Some(now);
        }
    }

    fn trip(record: &mut CircuitRecord, now: DateTime<Utc>) {
        record.state = CircuitState::Open;
        record.opened_at = Some(now);
        record.success_count = 0;
        record.half_open_attempts = 0;
        record.trial_admitted_at = None;
    }

    fn fire(&self, transition: Option<Transition>) {
        let Some(transition) = transition else {
            return;
        };
        let key = redact_key(&self.key);
        let hook = match transition {
            Transition::Opened => {
                warn!(key = %key, "Circuit breaker transitioning to OPEN");
                &self.config.hooks.on_open
            }
            Transition::Closed => {
                info!(key = %key, "Circuit breaker transitioning to CLOSED");
                &self.config.hooks.on_close
            }
            Transition::HalfOpened => {
                info!(key = %key, "Circuit breaker transitioning to HALF_OPEN");
                &self.config.hooks.on_half_open
            }
        };
        if let Some(hook) = hook {
            hook(self.key.as_str());
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("key", &self.key)
            .field("config", &self.config)
            .field("record", &self.store.load(&self.key))
            .finish()
    }
}

/// Builds [`CircuitBreaker`] handles for calls over one shared store
#[derive(Clone)]
pub struct CircuitBreakerRegistry {
    store: Arc<dyn CircuitStore>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerRegistry {
    /// Create a registry over the given store
    pub fn new(store: Arc<dyn CircuitStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create a registry with a process-local store
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(MemoryCircuitStore::new()), clock)
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn CircuitStore> {
        &self.store
    }

    /// Effective circuit breaker config for a call
    pub fn config<'a>(scope: &'a Dependency, call: &'a dyn Call) -> Option<&'a CircuitBreakerConfig> {
        resolve_config(call.circuit_breaker(), scope.circuit_breaker())
    }

    /// Breaker for a call, or `None` when no circuit breaker applies
    pub fn breaker(&self, scope: &Dependency, call: &dyn Call) -> Option<CircuitBreaker> {
        let config = Self::config(scope, call)?;
        let key = resolve_key(config.key.as_ref(), scope, call);
        Some(self.breaker_for(key, config.clone()))
    }

    /// Breaker for an explicit key
    pub fn breaker_for(&self, key: impl Into<String>, config: CircuitBreakerConfig) -> CircuitBreaker {
        CircuitBreaker::new(key, config, self.store.clone(), self.clock.clone())
    }

    /// Forget every circuit
    pub fn clear(&self) {
        self.store.clear();
    }
}

impl fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::types::CallSpec;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(config: CircuitBreakerConfig) -> (Arc<MockClock>, CircuitBreaker) {
        let clock = Arc::new(MockClock::at_epoch());
        let registry = CircuitBreakerRegistry::in_memory(clock.clone());
        (clock, registry.breaker_for("svc", config))
    }

    fn counter() -> (Arc<AtomicU32>, impl Fn(&str) + Send + Sync + 'static) {
        let count = Arc::new(AtomicU32::new(0));
        let handle = count.clone();
        (count, move |_: &str| {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_initial_state() {
        let (_clock, cb) = breaker(CircuitBreakerConfig::new());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request().is_ok());
        assert_eq!(cb.snapshot(), CircuitRecord::default());
    }

    #[test]
    fn test_failures_open_circuit() {
        let (_clock, cb) = breaker(CircuitBreakerConfig::new().failure_threshold(3));

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.allow_request().is_err());
    }

    #[test]
    fn test_open_reports_remaining_timeout() {
        let (clock, cb) = breaker(
            CircuitBreakerConfig::new()
                .failure_threshold(1)
                .reset_timeout(Duration::from_secs(5)),
        );
        cb.record_failure();
        clock.advance(Duration::from_secs(4));

        let err = cb.allow_request().unwrap_err();
        assert_eq!(err.message, "circuit is open");
        assert_eq!(err.retry_after, Some(Duration::from_secs(1)));
        assert_eq!(cb.retry_after(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_half_open_after_timeout() {
        let (clock, cb) = breaker(
            CircuitBreakerConfig::new()
                .failure_threshold(1)
                .reset_timeout(Duration::from_secs(5)),
        );
        cb.record_failure();

        clock.advance(Duration::from_secs(4));
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(1));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.retry_after(), None);
    }

    #[test]
    fn test_half_open_capacity() {
        let (clock, cb) = breaker(
            CircuitBreakerConfig::new()
                .failure_threshold(1)
                .reset_timeout(Duration::from_secs(5))
                .half_open_requests(2),
        );
        cb.record_failure();
        clock.advance(Duration::from_secs(5));

        assert!(cb.allow_request().is_ok());
        assert!(cb.allow_request().is_ok());

        let err = cb.allow_request().unwrap_err();
        assert_eq!(err.message, "half-open and at capacity");
        assert_eq!(err.retry_after, None);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let (clock, cb) = breaker(
            CircuitBreakerConfig::new()
                .failure_threshold(1)
                .reset_timeout(Duration::from_secs(5)),
        );
        cb.record_failure();
        clock.advance(Duration::from_secs(5));
        cb.allow_request().unwrap();

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.snapshot().opened_at, Some(clock.now()));
        assert_eq!(cb.retry_after(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_half_open_successes_close() {
        let (clock, cb) = breaker(
            CircuitBreakerConfig::new()
                .failure_threshold(1)
                .reset_timeout(Duration::from_secs(5))
                .success_threshold(2),
        );
        cb.record_failure();
        clock.advance(Duration::from_secs(5));

        cb.allow_request().unwrap();
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.allow_request().unwrap();
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot(), CircuitRecord::default());
    }

    #[test]
    fn test_unrecorded_trial_slot_is_released() {
        let (clock, cb) = breaker(
            CircuitBreakerConfig::new()
                .failure_threshold(1)
                .reset_timeout(Duration::from_secs(5))
                .half_open_requests(1),
        );
        cb.record_failure();
        clock.advance(Duration::from_secs(5));

        // Admitted, but its outcome is never recorded
        cb.allow_request().unwrap();
        clock.advance(Duration::from_secs(4));
        assert!(cb.allow_request().is_err());

        clock.advance(Duration::from_secs(1));
        assert!(cb.allow_request().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.snapshot().half_open_attempts, 1);

        cb.record_success();
        cb.allow_request().unwrap();
        cb.record_success();
        cb.allow_request().unwrap();
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_closed_circuits_leave_no_records() {
        let clock = Arc::new(MockClock::at_epoch());
        let store = Arc::new(MemoryCircuitStore::new());
        let registry = CircuitBreakerRegistry::new(store.clone(), clock.clone());
        let config = CircuitBreakerConfig::new()
            .failure_threshold(1)
            .reset_timeout(Duration::from_secs(5))
            .success_threshold(1);

        for i in 0..100 {
            registry
                .breaker_for(format!("user:{i}"), config.clone())
                .record_success();
        }
        assert!(store.is_empty());

        let cb = registry.breaker_for("user:0", config);
        cb.record_failure();
        assert_eq!(store.len(), 1);

        clock.advance(Duration::from_secs(5));
        cb.allow_request().unwrap();
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(store.is_empty());

        cb.open();
        cb.reset();
        assert!(store.is_empty());
    }

    #[test]
    fn test_success_while_closed_keeps_failures() {
        let (_clock, cb) = breaker(CircuitBreakerConfig::new().failure_threshold(3));

        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.snapshot().failure_count, 2);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_failure_while_open_is_ignored() {
        let (clock, cb) = breaker(CircuitBreakerConfig::new().failure_threshold(1));
        cb.record_failure();
        let opened = cb.snapshot().opened_at;

        clock.advance(Duration::from_secs(1));
        cb.record_failure();
        assert_eq!(cb.snapshot().opened_at, opened);
    }

    #[test]
    fn test_failure_window_expires_old_failures() {
        let (clock, cb) = breaker(
            CircuitBreakerConfig::new()
                .failure_threshold(3)
                .failure_window(Duration::from_secs(10)),
        );

        cb.record_failure();
        cb.record_failure();
        clock.advance(Duration::from_secs(10));

        cb.record_failure();
        assert_eq!(cb.snapshot().failure_count, 1);
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_hooks_fire_once_per_transition() {
        let (opened, on_open) = counter();
        let (closed, on_close) = counter();
        let (half_opened, on_half_open) = counter();
        let (clock, cb) = breaker(
            CircuitBreakerConfig::new()
                .failure_threshold(1)
                .success_threshold(1)
                .reset_timeout(Duration::from_secs(5))
                .on_open(on_open)
                .on_close(on_close)
                .on_half_open(on_half_open),
        );

        cb.record_failure();
        cb.record_failure();
        assert_eq!(opened.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(5));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.allow_request().unwrap();
        assert_eq!(half_opened.load(Ordering::SeqCst), 1);

        cb.record_success();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hook_receives_key() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let (_clock, cb) = breaker(
            CircuitBreakerConfig::new()
                .failure_threshold(1)
                .on_open(move |key: &str| sink.lock().push(key.to_string())),
        );

        cb.record_failure();
        assert_eq!(*seen.lock(), vec!["svc".to_string()]);
    }

    #[test]
    fn test_manual_open_close_reset() {
        let (_clock, cb) = breaker(CircuitBreakerConfig::new());

        cb.open();
        assert_eq!(cb.state(), CircuitState::Open);

        cb.close();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        cb.reset();
        assert_eq!(cb.snapshot(), CircuitRecord::default());
    }

    #[test]
    fn test_record_result() {
        let (_clock, cb) = breaker(CircuitBreakerConfig::new().failure_threshold(1));

        cb.record::<(), &str>(&Ok(()));
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record::<(), &str>(&Err("boom"));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_registry_shares_state_per_key() {
        let clock = Arc::new(MockClock::at_epoch());
        let registry = CircuitBreakerRegistry::in_memory(clock);
        let scope = Dependency::new("payments")
            .with_circuit_breaker(CircuitBreakerConfig::new().failure_threshold(1));
        let call = CallSpec::new("charge");

        registry.breaker(&scope, &call).unwrap().record_failure();

        let again = registry.breaker(&scope, &call).unwrap();
        assert_eq!(again.key(), "payments");
        assert_eq!(again.state(), CircuitState::Open);
    }

    #[test]
    fn test_registry_resolves_templated_key() {
        let clock = Arc::new(MockClock::at_epoch());
        let registry = CircuitBreakerRegistry::in_memory(clock);
        let scope = Dependency::new("payments");
        let call = CallSpec::new("charge")
            .with_field("region", "eu")
            .with_circuit_breaker(CircuitBreakerConfig::new().key("payments:{region}"));

        assert!(registry.breaker(&scope, &CallSpec::new("charge")).is_none());
        assert_eq!(registry.breaker(&scope, &call).unwrap().key(), "payments:eu");
    }

    #[test]
    fn test_validate() {
        assert!(CircuitBreakerConfig::new().validate().is_ok());
        assert!(CircuitBreakerConfig::new().failure_threshold(0).validate().is_err());
        assert!(CircuitBreakerConfig::new().half_open_requests(0).validate().is_err());
    }
}
