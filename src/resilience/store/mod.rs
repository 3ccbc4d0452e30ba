//! Fixed-window counter storage for the rate limiter.
//!
//! Two backends share one contract: [`MemoryCounterStore`] for a single
//! process and tests, and (with the `postgres` feature) `PostgresCounterStore`
//! for limits shared by several worker processes.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::clock::{add_saturating, elapsed_between};
use crate::errors::StoreError;

pub use memory::MemoryCounterStore;
#[cfg(feature = "postgres")]
pub use postgres::{PostgresCounterStore, PostgresStoreConfig};

/// Counter for one key within one fixed window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitBucket {
    /// Attempts recorded in this window, refused ones included
    pub count: u32,
    /// When the window opened
    pub window_start: DateTime<Utc>,
    /// Window length
    pub window: Duration,
}

impl RateLimitBucket {
    /// Fresh bucket holding the first attempt
    pub fn open(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            count: 1,
            window_start: now,
            window,
        }
    }

    /// A bucket only counts while `now - window_start < window`
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_start && elapsed_between(self.window_start, now) < self.window
    }

    /// When the window closes, clamped to the last representable instant
    pub fn reset_at(&self) -> DateTime<Utc> {
        add_saturating(self.window_start, self.window)
    }
}

/// Storage contract for fixed-window counters.
///
/// `increment` must be atomic: concurrent callers each observe a distinct
/// count, so no more than `limit` of them are admitted within one window.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Count an attempt and return the count after it.
    ///
    /// An expired bucket is replaced by a fresh one with a count of 1.
    async fn increment(&self, key: &str, window: Duration) -> Result<u32, StoreError>;

    /// Count an attempt and report whether it is within `limit`.
    ///
    /// A refused attempt still counts against the window.
    async fn attempt(&self, key: &str, limit: u32, window: Duration) -> Result<bool, StoreError> {
        Ok(self.increment(key, window).await? <= limit)
    }

    /// Attempts in the current window (0 if absent or expired)
    async fn count(&self, key: &str) -> Result<u32, StoreError>;

    /// `max(0, limit - count)`
    async fn remaining(&self, key: &str, limit: u32) -> Result<u32, StoreError> {
        Ok(limit.saturating_sub(self.count(key).await?))
    }

    /// When the current window closes, if one is open
    async fn reset_time(&self, key: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Drop the bucket for a key
    async fn reset(&self, key: &str) -> Result<(), StoreError>;

    /// Drop every bucket
    async fn clear(&self) -> Result<(), StoreError>;
}
