//! Process-local counter store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::{CounterStore, RateLimitBucket};
use crate::clock::{add_saturating, Clock, SystemClock};
use crate::errors::StoreError;

/// Minimum clock time between sweeps of expired buckets
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Counter store kept in a mutex-guarded map.
///
/// The lock makes `increment` atomic within one process; it offers no
/// coordination between processes. Expired buckets are swept when a new key
/// is inserted, at most once a minute of clock time.
pub struct MemoryCounterStore {
    state: Mutex<Buckets>,
    clock: Arc<dyn Clock>,
}

#[derive(Default)]
struct Buckets {
    buckets: HashMap<String, RateLimitBucket>,
    next_sweep: Option<DateTime<Utc>>,
}

impl Buckets {
    fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| bucket.is_valid(now));
        self.next_sweep = Some(add_saturating(now, SWEEP_INTERVAL));
        before - self.buckets.len()
    }

    fn sweep_if_due(&mut self, now: DateTime<Utc>) {
        if self.next_sweep.map_or(true, |at| now >= at) {
            self.purge_expired(now);
        }
    }
}

impl MemoryCounterStore {
    /// Create a store using the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store using the given clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(Buckets::default()),
            clock,
        }
    }

    /// Current bucket for a key, if still valid
    pub fn bucket(&self, key: &str) -> Option<RateLimitBucket> {
        let now = self.clock.now();
        self.state
            .lock()
            .buckets
            .get(key)
            .filter(|bucket| bucket.is_valid(now))
            .cloned()
    }

    /// Number of buckets held, expired ones not yet swept included
    pub fn len(&self) -> usize {
        self.state.lock().buckets.len()
    }

    /// True when no buckets are held
    pub fn is_empty(&self) -> bool {
        self.state.lock().buckets.is_empty()
    }

    /// Drop expired buckets now
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.state.lock().purge_expired(now)
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCounterStore")
            .field("buckets", &self.len())
            .finish()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u32, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if let Some(bucket) = state.buckets.get_mut(key).filter(|bucket| bucket.is_valid(now)) {
            bucket.count = bucket.count.saturating_add(1);
            return Ok(bucket.count);
        }

        state.sweep_if_due(now);
        state
            .buckets
            .insert(key.to_string(), RateLimitBucket::open(now, window));
        Ok(1)
    }

    async fn count(&self, key: &str) -> Result<u32, StoreError> {
        Ok(self.bucket(key).map_or(0, |bucket| bucket.count))
    }

    async fn reset_time(&self, key: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.bucket(key).map(|bucket| bucket.reset_at()))
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.state.lock().buckets.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.state.lock().buckets.clear();
        Ok(())
    }
}
