//! Per-key circuit state storage.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, requests flow through
    #[default]
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Testing if the dependency has recovered
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Stored state of one circuit
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitRecord {
    /// Current state
    pub state: CircuitState,
    /// Failures counted toward opening
    pub failure_count: u32,
    /// Half-open successes counted toward closing
    pub success_count: u32,
    /// When the circuit last opened
    pub opened_at: Option<DateTime<Utc>>,
    /// Trial requests admitted and not yet recorded while half-open
    pub half_open_attempts: u32,
    /// When the latest half-open trial request was admitted
    pub trial_admitted_at: Option<DateTime<Utc>>,
    /// Start of the current failure window
    pub window_started_at: Option<DateTime<Utc>>,
}

/// Storage contract for circuit records.
///
/// `update` runs its closure while holding whatever lock guards the key, so a
/// read-modify-write is atomic with respect to other callers of the same store.
/// Closures must not call back into the store.
pub trait CircuitStore: Send + Sync {
    /// Snapshot of the record for a key
    fn load(&self, key: &str) -> Option<CircuitRecord>;

    /// Mutate the record for a key in place; leaving `None` removes it
    fn update(&self, key: &str, f: &mut dyn FnMut(&mut Option<CircuitRecord>));

    /// Drop the record for a key
    fn remove(&self, key: &str);

    /// Drop every record
    fn clear(&self);
}

/// Process-local circuit store
#[derive(Default)]
pub struct MemoryCircuitStore {
    records: Mutex<HashMap<String, CircuitRecord>>,
}

impl MemoryCircuitStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of circuits held
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// True when no circuits are held
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Keys of every held circuit, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.records.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl fmt::Debug for MemoryCircuitStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCircuitStore")
            .field("circuits", &self.len())
            .finish()
    }
}

impl CircuitStore for MemoryCircuitStore {
    fn load(&self, key: &str) -> Option<CircuitRecord> {
        self.records.lock().get(key).cloned()
    }

    fn update(&self, key: &str, f: &mut dyn FnMut(&mut Option<CircuitRecord>)) {
        let mut records = self.records.lock();
        let mut slot = records.remove(key);
        f(&mut slot);
        if let Some(record) = slot {
            records.insert(key.to_string(), record);
        }
    }

    fn remove(&self, key: &str) {
        self.records.lock().remove(key);
    }

    fn clear(&self) {
        self.records.lock().clear();
    }
}
