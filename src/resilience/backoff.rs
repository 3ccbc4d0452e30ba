//! Backoff curves for rate limit refusals.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::types::Call;

/// Pluggable backoff computation.
///
/// Implementations may honour `retry_after_hint` (a server-supplied
/// `Retry-After`) instead of their own formula.
pub trait BackoffPolicy: Send + Sync {
    /// Delay before the given attempt (1-based)
    fn backoff(&self, call: &dyn Call, attempt: u32, retry_after_hint: Option<Duration>) -> Duration;
}

/// Backoff strategy for a rate limit
#[derive(Clone)]
pub enum Backoff {
    /// `base * 2^(attempt - 1)`
    Exponential {
        /// Delay for the first attempt
        base: Duration,
    },
    /// `base * attempt`
    Linear {
        /// Delay step
        base: Duration,
    },
    /// `base` for every attempt
    Fixed {
        /// Constant delay
        base: Duration,
    },
    /// Delegate entirely to a policy object
    Custom(Arc<dyn BackoffPolicy>),
}

impl Backoff {
    /// Exponential backoff
    pub fn exponential(base: Duration) -> Self {
        Self::Exponential { base }
    }

    /// Linear backoff
    pub fn linear(base: Duration) -> Self {
        Self::Linear { base }
    }

    /// Constant backoff
    pub fn fixed(base: Duration) -> Self {
        Self::Fixed { base }
    }

    /// Custom policy
    pub fn custom(policy: impl BackoffPolicy + 'static) -> Self {
        Self::Custom(Arc::new(policy))
    }

    /// Strategy by name; unknown names fall back to a constant delay.
    pub fn named(name: &str, base: Duration) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "exponential" => Self::Exponential { base },
            "linear" => Self::Linear { base },
            "fixed" | "constant" => Self::Fixed { base },
            other => {
                debug!(strategy = other, "Unknown backoff strategy, using fixed delay");
                Self::Fixed { base }
            }
        }
    }

    /// Base delay, if the strategy has one
    pub fn base(&self) -> Option<Duration> {
        match self {
            Self::Exponential { base } | Self::Linear { base } | Self::Fixed { base } => Some(*base),
            Self::Custom(_) => None,
        }
    }

    /// Growth factor between consecutive attempts, where one exists
    pub(crate) fn multiplier(&self) -> f64 {
        match self {
            Self::Exponential { .. } => 2.0,
            _ => 1.0,
        }
    }

    /// Delay before `attempt` (1-based; 0 is treated as 1)
    pub fn delay(&self, call: &dyn Call, attempt: u32, retry_after_hint: Option<Duration>) -> Duration {
        let attempt = attempt.max(1);
        match self {
            Self::Exponential { base } => {
                let factor = 2u64.checked_pow(attempt - 1).unwrap_or(u64::MAX);
                scale(*base, factor)
            }
            Self::Linear { base } => scale(*base, u64::from(attempt)),
            Self::Fixed { base } => *base,
            Self::Custom(policy) => policy.backoff(call, attempt, retry_after_hint),
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
        }
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exponential { base } => f.debug_struct("Exponential").field("base", base).finish(),
            Self::Linear { base } => f.debug_struct("Linear").field("base", base).finish(),
            Self::Fixed { base } => f.debug_struct("Fixed").field("base", base).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Honours a server `Retry-After` when present, otherwise backs off exponentially.
#[derive(Debug, Clone)]
pub struct RetryAfterBackoff {
    base: Duration,
    max: Duration,
}

impl RetryAfterBackoff {
    /// Create with the exponential base and an upper bound
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }
}

impl BackoffPolicy for RetryAfterBackoff {
    fn backoff(&self, call: &dyn Call, attempt: u32, retry_after_hint: Option<Duration>) -> Duration {
        match retry_after_hint {
            Some(hint) => hint,
            None => Backoff::exponential(self.base)
                .delay(call, attempt, None)
                .min(self.max),
        }
    }
}

/// `base * factor` in whole milliseconds, saturating
fn scale(base: Duration, factor: u64) -> Duration {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor))
}
