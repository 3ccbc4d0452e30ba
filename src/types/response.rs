//! Outcome model: what the resilience layer needs to know about a response.

use chrono::{DateTime, Utc};
use http::HeaderMap;
use std::time::Duration;

use crate::clock::{checked_add, elapsed_between};

/// A transport response as seen by the retry and circuit logic.
pub trait RetryableResponse {
    /// HTTP status code
    fn status(&self) -> u16;

    /// Whether the status is in the 5xx range
    fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status())
    }

    /// Response headers, if the response carries any
    fn headers(&self) -> Option<&HeaderMap> {
        None
    }

    /// Parsed rate limit headers
    fn rate_limit_headers(&self, now: DateTime<Utc>) -> Option<RateLimitHeaders> {
        self.headers()
            .map(|headers| RateLimitHeaders::from_headers(headers, now))
            .filter(|parsed| !parsed.is_empty())
    }
}

impl<B> RetryableResponse for http::Response<B> {
    fn status(&self) -> u16 {
        http::Response::status(self).as_u16()
    }

    fn headers(&self) -> Option<&HeaderMap> {
        Some(http::Response::headers(self))
    }
}

/// Bare status code, used where a body is irrelevant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusOnly(pub u16);

impl RetryableResponse for StatusOnly {
    fn status(&self) -> u16 {
        self.0
    }
}

/// Standard rate limit headers, parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// `X-RateLimit-Limit`
    pub limit: Option<u32>,
    /// `X-RateLimit-Remaining`
    pub remaining: Option<u32>,
    /// `X-RateLimit-Reset` (Unix seconds)
    pub reset: Option<DateTime<Utc>>,
    /// `Retry-After`, resolved to an absolute instant
    pub retry_at: Option<DateTime<Utc>>,
}

impl RateLimitHeaders {
    /// Parse rate limit headers from HTTP response headers.
    ///
    /// `Retry-After` may be delta-seconds or an HTTP-date; delta-seconds are
    /// anchored at `now`.
    pub fn from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Self {
        let text = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);

        let retry_at = text("retry-after").and_then(|value| match value.parse::<u64>() {
            Ok(secs) => checked_add(now, Duration::from_secs(secs)),
            Err(_) => DateTime::parse_from_rfc2822(value)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        });

        Self {
            limit: text("x-ratelimit-limit").and_then(|v| v.parse().ok()),
            remaining: text("x-ratelimit-remaining").and_then(|v| v.parse().ok()),
            reset: text("x-ratelimit-reset")
                .and_then(|v| v.parse::<i64>().ok())
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
            retry_at,
        }
    }

    /// True when none of the headers were present
    pub fn is_empty(&self) -> bool {
        self.limit.is_none()
            && self.remaining.is_none()
            && self.reset.is_none()
            && self.retry_at.is_none()
    }

    /// How long the server asked us to wait.
    ///
    /// `Retry-After` wins; otherwise an exhausted window (`remaining == 0`)
    /// points at the reset time.
    pub fn retry_after_hint(&self, now: DateTime<Utc>) -> Option<Duration> {
        if let Some(retry_at) = self.retry_at {
            return Some(elapsed_between(now, retry_at));
        }
        match (self.remaining, self.reset) {
            (Some(0), Some(reset)) => Some(elapsed_between(now, reset)),
            _ => None,
        }
    }
}
