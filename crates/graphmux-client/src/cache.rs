//! Normalized query-result cache with snapshot support.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use graphmux_core::InMemoryCacheOptions;

/// Serializable cache contents, used as the per-client slot of the render
/// payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot(pub BTreeMap<String, serde_json::Value>);

/// Per-client query-result cache.
///
/// Entries are keyed by the deterministic cache key of the query document,
/// its variables, and the owning client's name. Insertion order is tracked
/// so `max_entries` evicts oldest first.
#[derive(Debug, Default)]
pub struct QueryCache {
    options: InMemoryCacheOptions,
    state: RwLock<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: BTreeMap<String, serde_json::Value>,
    order: Vec<String>,
}

impl QueryCache {
    /// Create a cache with the client's configured options.
    #[must_use]
    pub fn new(options: InMemoryCacheOptions) -> Self {
        Self {
            options,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Look up a cached result.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.state.read().entries.get(key).cloned()
    }

    /// Store a result, evicting the oldest entry beyond `max_entries`.
    pub fn insert(&self, key: &str, value: serde_json::Value) {
        let mut state = self.state.write();
        if state.entries.insert(key.to_string(), value).is_none() {
            state.order.push(key.to_string());
        }
        if let Some(max) = self.options.max_entries {
            while state.order.len() > max {
                let oldest = state.order.remove(0);
                state.entries.remove(&oldest);
            }
        }
    }

    /// Serialize the cache contents.
    #[must_use]
    pub fn extract(&self) -> CacheSnapshot {
        CacheSnapshot(self.state.read().entries.clone())
    }

    /// Replace the cache contents from a snapshot.
    pub fn restore(&self, snapshot: &CacheSnapshot) {
        let mut state = self.state.write();
        state.entries = snapshot.0.clone();
        state.order = snapshot.0.keys().cloned().collect();
    }

    /// Clear every cached result.
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.order.clear();
    }

    /// Number of cached results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Returns `true` when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restore_round_trips_every_key() {
        let cache = QueryCache::new(InMemoryCacheOptions::default());
        cache.insert("a", serde_json::json!({"me": {"name": "Ann"}}));
        cache.insert("b", serde_json::json!([1, 2, 3]));
        let snapshot = cache.extract();

        let fresh = QueryCache::new(InMemoryCacheOptions::default());
        fresh.restore(&snapshot);
        for (key, value) in &snapshot.0 {
            assert_eq!(fresh.get(key).as_ref(), Some(value));
        }
        assert_eq!(fresh.extract(), snapshot);
    }

    #[test]
    fn max_entries_evicts_oldest_first() {
        let cache = QueryCache::new(InMemoryCacheOptions {
            max_entries: Some(2),
        });
        cache.insert("a", serde_json::json!(1));
        cache.insert("b", serde_json::json!(2));
        cache.insert("c", serde_json::json!(3));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(serde_json::json!(2)));
        assert_eq!(cache.get("c"), Some(serde_json::json!(3)));
    }

    #[test]
    fn reset_clears_everything() {
        let cache = QueryCache::new(InMemoryCacheOptions::default());
        cache.insert("a", serde_json::json!(1));
        cache.reset();
        assert!(cache.is_empty());
    }
}
