//! Time-bounded memoization for aggregator results.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A cache entry is served for a fixed TTL from insertion and never beyond
/// it. This is a performance layer only: a concurrent miss recomputing the
/// same key is safe because aggregation is deterministic over stored data.
///
/// A zero TTL disables the cache entirely, which keeps tests deterministic.
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.lock().expect("cache lock poisoned");
        entries
            .get(key)
            .and_then(|(stored_at, value)| (stored_at.elapsed() < self.ttl).then(|| value.clone()))
    }

    pub fn insert(&self, key: String, value: V) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        // Expired entries are dropped on write so the map stays bounded by
        // the keys queried within one TTL window.
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < self.ttl);
        entries.insert(key, (Instant::now(), value));
    }
}
