//! Settings for dependency-level resilience defaults.
//!
//! Settings use plain numbers (milliseconds) so they can come from JSON files
//! or environment variables, and convert into the typed configs carried by a
//! [`Dependency`].

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{ConfigurationError, ResilienceResult};
use crate::resilience::{Backoff, CircuitBreakerConfig, RateLimitConfig, RetryConfig};
use crate::types::Dependency;

/// Rate limit settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Requests per window
    pub requests: u32,
    /// Window length in milliseconds
    pub per_ms: u64,
    /// Retry refused calls
    pub retry: bool,
    /// Retries after a refusal
    pub max_retries: u32,
    /// Backoff strategy name (`exponential`, `linear`, `fixed`)
    pub backoff: String,
    /// Backoff base in milliseconds
    pub backoff_base_ms: u64,
    /// Key template
    pub key: Option<String>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests: 60,
            per_ms: 60_000,
            retry: false,
            max_retries: 3,
            backoff: "exponential".to_string(),
            backoff_base_ms: 1_000,
            key: None,
        }
    }
}

impl RateLimitSettings {
    /// Typed rate limit config
    pub fn to_config(&self) -> RateLimitConfig {
        let mut config = RateLimitConfig::new(self.requests, Duration::from_millis(self.per_ms))
            .retry(self.retry)
            .max_retries(self.max_retries)
            .backoff(Backoff::named(&self.backoff, Duration::from_millis(self.backoff_base_ms)));
        if let Some(key) = &self.key {
            config = config.key(key.as_str());
        }
        config
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Failures before opening
    pub failure_threshold: u32,
    /// Open duration in milliseconds
    pub reset_timeout_ms: u64,
    /// Half-open trial capacity
    pub half_open_requests: u32,
    /// Failure window in milliseconds
    pub failure_window_ms: Option<u64>,
    /// Half-open successes before closing
    pub success_threshold: u32,
    /// Key template
    pub key: Option<String>,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            failure_threshold: defaults.failure_threshold,
            reset_timeout_ms: defaults.reset_timeout.as_millis() as u64,
            half_open_requests: defaults.half_open_requests,
            failure_window_ms: None,
            success_threshold: defaults.success_threshold,
            key: None,
        }
    }
}

impl CircuitBreakerSettings {
    /// Typed circuit breaker config
    pub fn to_config(&self) -> CircuitBreakerConfig {
        let mut config = CircuitBreakerConfig::new()
            .failure_threshold(self.failure_threshold)
            .reset_timeout(Duration::from_millis(self.reset_timeout_ms))
            .half_open_requests(self.half_open_requests)
            .success_threshold(self.success_threshold);
        if let Some(window) = self.failure_window_ms {
            config = config.failure_window(Duration::from_millis(window));
        }
        if let Some(key) = &self.key {
            config = config.key(key.as_str());
        }
        config
    }
}

/// Retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts
    pub times: u32,
    /// First retry delay in milliseconds
    pub delay_ms: u64,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Delay cap in milliseconds
    pub max_delay_ms: u64,
    /// Jitter fraction
    pub jitter: f64,
    /// Status codes to retry
    pub retryable_status_codes: Vec<u16>,
    /// Registered policy name
    pub policy: Option<String>,
    /// Registered decider or call method name
    pub decider: Option<String>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            times: defaults.times,
            delay_ms: defaults.base_delay.as_millis() as u64,
            multiplier: defaults.multiplier,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            jitter: 0.0,
            retryable_status_codes: Vec::new(),
            policy: None,
            decider: None,
        }
    }
}

impl RetrySettings {
    /// Typed retry config
    pub fn to_config(&self) -> RetryConfig {
        let mut config = RetryConfig::new()
            .times(self.times)
            .delay(Duration::from_millis(self.delay_ms))
            .multiplier(self.multiplier)
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .jitter(self.jitter)
            .retry_on_status(self.retryable_status_codes.iter().copied());
        if let Some(policy) = &self.policy {
            config = config.policy_named(policy.as_str());
        }
        if let Some(decider) = &self.decider {
            config = config.decider_named(decider.as_str());
        }
        config
    }
}

/// Resilience defaults for one dependency; absent sections are disabled
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    /// Rate limit
    pub rate_limit: Option<RateLimitSettings>,
    /// Circuit breaker
    pub circuit_breaker: Option<CircuitBreakerSettings>,
    /// Retry
    pub retry: Option<RetrySettings>,
}

impl ResilienceSettings {
    /// Parse settings from JSON
    pub fn from_json(json: &str) -> ResilienceResult<Self> {
        let settings: Self = serde_json::from_str(json).map_err(|e| {
            ConfigurationError::InvalidConfiguration {
                message: e.to_string(),
            }
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Create settings from environment variables.
    ///
    /// Reads:
    /// - `RESILIENCE_RATE_LIMIT_REQUESTS` - enables the rate limit; also
    ///   `_PER_MS`, `_RETRY`, `_MAX_RETRIES`, `_BACKOFF`, `_BACKOFF_BASE_MS`, `_KEY`
    /// - `RESILIENCE_CIRCUIT_FAILURE_THRESHOLD` - enables the circuit breaker; also
    ///   `_RESET_TIMEOUT_MS`, `_HALF_OPEN_REQUESTS`, `_SUCCESS_THRESHOLD`, `_FAILURE_WINDOW_MS`, `_KEY`
    /// - `RESILIENCE_RETRY_TIMES` - enables retries; also `_DELAY_MS`, `_MULTIPLIER`,
    ///   `_MAX_DELAY_MS`, `_JITTER`, `_STATUS_CODES` (comma separated), `_POLICY`, `_DECIDER`
    pub fn from_env() -> ResilienceResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Create settings from any variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ResilienceResult<Self> {
        let vars = Vars(&lookup);
        let mut settings = Self::default();

        if let Some(requests) = vars.parse("RESILIENCE_RATE_LIMIT_REQUESTS")? {
            let defaults = RateLimitSettings::default();
            settings.rate_limit = Some(RateLimitSettings {
                requests,
                per_ms: vars.parse("RESILIENCE_RATE_LIMIT_PER_MS")?.unwrap_or(defaults.per_ms),
                retry: vars.flag("RESILIENCE_RATE_LIMIT_RETRY")?.unwrap_or(defaults.retry),
                max_retries: vars
                    .parse("RESILIENCE_RATE_LIMIT_MAX_RETRIES")?
                    .unwrap_or(defaults.max_retries),
                backoff: vars.text("RESILIENCE_RATE_LIMIT_BACKOFF").unwrap_or(defaults.backoff),
                backoff_base_ms: vars
                    .parse("RESILIENCE_RATE_LIMIT_BACKOFF_BASE_MS")?
                    .unwrap_or(defaults.backoff_base_ms),
                key: vars.text("RESILIENCE_RATE_LIMIT_KEY"),
            });
        }

        if let Some(failure_threshold) = vars.parse("RESILIENCE_CIRCUIT_FAILURE_THRESHOLD")? {
            let defaults = CircuitBreakerSettings::default();
            settings.circuit_breaker = Some(CircuitBreakerSettings {
                failure_threshold,
                reset_timeout_ms: vars
                    .parse("RESILIENCE_CIRCUIT_RESET_TIMEOUT_MS")?
                    .unwrap_or(defaults.reset_timeout_ms),
                half_open_requests: vars
                    .parse("RESILIENCE_CIRCUIT_HALF_OPEN_REQUESTS")?
                    .unwrap_or(defaults.half_open_requests),
                failure_window_ms: vars.parse("RESILIENCE_CIRCUIT_FAILURE_WINDOW_MS")?,
                success_threshold: vars
                    .parse("RESILIENCE_CIRCUIT_SUCCESS_THRESHOLD")?
                    .unwrap_or(defaults.success_threshold),
                key: vars.text("RESILIENCE_CIRCUIT_KEY"),
            });
        }

        if let Some(times) = vars.parse("RESILIENCE_RETRY_TIMES")? {
            let defaults = RetrySettings::default();
            settings.retry = Some(RetrySettings {
                times,
                delay_ms: vars.parse("RESILIENCE_RETRY_DELAY_MS")?.unwrap_or(defaults.delay_ms),
                multiplier: vars
                    .parse("RESILIENCE_RETRY_MULTIPLIER")?
                    .unwrap_or(defaults.multiplier),
                max_delay_ms: vars
                    .parse("RESILIENCE_RETRY_MAX_DELAY_MS")?
                    .unwrap_or(defaults.max_delay_ms),
                jitter: vars.parse("RESILIENCE_RETRY_JITTER")?.unwrap_or(defaults.jitter),
                retryable_status_codes: vars.list("RESILIENCE_RETRY_STATUS_CODES")?,
                policy: vars.text("RESILIENCE_RETRY_POLICY"),
                decider: vars.text("RESILIENCE_RETRY_DECIDER"),
            });
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if let Some(rate_limit) = &self.rate_limit {
            rate_limit.to_config().validate()?;
        }
        if let Some(circuit) = &self.circuit_breaker {
            circuit.to_config().validate()?;
        }
        if let Some(retry) = &self.retry {
            if retry.times == 0 {
                return Err(ConfigurationError::ZeroValue { field: "times" });
            }
            if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
                return Err(ConfigurationError::InvalidConfiguration {
                    message: format!("multiplier must be at least 1.0, got {}", retry.multiplier),
                });
            }
            if retry.max_delay_ms < retry.delay_ms {
                return Err(ConfigurationError::InvalidConfiguration {
                    message: "max_delay_ms must not be below delay_ms".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Build a dependency carrying these defaults
    pub fn into_dependency(self, name: impl Into<String>) -> ResilienceResult<Dependency> {
        self.validate()?;

        let mut dependency = Dependency::new(name);
        if let Some(rate_limit) = &self.rate_limit {
            dependency = dependency.with_rate_limit(rate_limit.to_config());
        }
        if let Some(circuit) = &self.circuit_breaker {
            dependency = dependency.with_circuit_breaker(circuit.to_config());
        }
        if let Some(retry) = &self.retry {
            dependency = dependency.with_retry(retry.to_config());
        }
        Ok(dependency)
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn text(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, ConfigurationError>
    where
        T::Err: std::fmt::Display,
    {
        self.text(name)
            .map(|value| value.parse::<T>().map_err(|e| env_error(name, e)))
            .transpose()
    }

    fn flag(&self, name: &str) -> Result<Option<bool>, ConfigurationError> {
        self.text(name)
            .map(|value| match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => Err(env_error(name, format!("not a boolean: {other}"))),
            })
            .transpose()
    }

    fn list<T: FromStr>(&self, name: &str) -> Result<Vec<T>, ConfigurationError>
    where
        T::Err: std::fmt::Display,
    {
        let Some(value) = self.text(name) else {
            return Ok(Vec::new());
        };
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| item.parse::<T>().map_err(|e| env_error(name, e)))
            .collect()
    }
}

fn env_error(name: &str, error: impl std::fmt::Display) -> ConfigurationError {
    ConfigurationError::EnvVar {
        name: name.to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ResilienceError;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_empty_environment_disables_everything() {
        let settings = ResilienceSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, ResilienceSettings::default());

        let dependency = settings.into_dependency("api").unwrap();
        assert!(dependency.rate_limit().is_none());
        assert!(dependency.circuit_breaker().is_none());
        assert!(dependency.retry().is_none());
    }

    #[test]
    fn test_from_lookup() {
        let settings = ResilienceSettings::from_lookup(lookup(&[
            ("RESILIENCE_RATE_LIMIT_REQUESTS", "10"),
            ("RESILIENCE_RATE_LIMIT_PER_MS", "1000"),
            ("RESILIENCE_RATE_LIMIT_RETRY", "yes"),
            ("RESILIENCE_CIRCUIT_FAILURE_THRESHOLD", "4"),
            ("RESILIENCE_CIRCUIT_FAILURE_WINDOW_MS", "30000"),
            ("RESILIENCE_RETRY_TIMES", "5"),
            ("RESILIENCE_RETRY_STATUS_CODES", "429, 503"),
        ]))
        .unwrap();

        let rate_limit = settings.rate_limit.clone().unwrap();
        assert_eq!(rate_limit.requests, 10);
        assert_eq!(rate_limit.per_ms, 1000);
        assert!(rate_limit.retry);

        let circuit = settings.circuit_breaker.clone().unwrap();
        assert_eq!(circuit.failure_threshold, 4);
        assert_eq!(circuit.failure_window_ms, Some(30_000));

        let dependency = settings.into_dependency("api").unwrap();
        let retry = dependency.retry().unwrap();
        assert_eq!(retry.times, 5);
        assert_eq!(retry.retryable_status_codes.iter().copied().collect::<Vec<_>>(), vec![429, 503]);
    }

    #[test]
    fn test_bad_number_is_reported() {
        let err = ResilienceSettings::from_lookup(lookup(&[("RESILIENCE_RETRY_TIMES", "many")]))
            .unwrap_err();
        match err {
            ResilienceError::Configuration(ConfigurationError::EnvVar { name, .. }) => {
                assert_eq!(name, "RESILIENCE_RETRY_TIMES");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_zero_limit_rejected() {
        let err = ResilienceSettings::from_lookup(lookup(&[("RESILIENCE_RATE_LIMIT_REQUESTS", "0")]))
            .unwrap_err();
        assert_eq!(err.error_code(), "RESILIENCE_CONFIG");
    }

    #[test]
    fn test_from_json() {
        let settings = ResilienceSettings::from_json(
            r#"{
                "rate_limit": {"requests": 5, "per_ms": 1000, "key": "api:{tenant}"},
                "retry": {"times": 4, "delay_ms": 250, "multiplier": 1.5}
            }"#,
        )
        .unwrap();

        let rate_limit = settings.rate_limit.as_ref().unwrap().to_config();
        assert_eq!(rate_limit.requests, 5);
        assert_eq!(rate_limit.per, Duration::from_secs(1));
        assert_eq!(rate_limit.key.as_ref().map(|k| k.as_str()), Some("api:{tenant}"));

        let retry = settings.retry.as_ref().unwrap();
        assert_eq!(retry.max_delay_ms, 30_000);
        assert!(settings.circuit_breaker.is_none());
    }

    #[test]
    fn test_from_json_rejects_bad_multiplier() {
        let result = ResilienceSettings::from_json(r#"{"retry": {"multiplier": 0.5}}"#);
        assert!(result.is_err());
    }
}
