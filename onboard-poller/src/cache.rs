//! Keyed store of the most recent values fetched from a portal.
//!
//! On-board portals are slow and drop out regularly, so the engine keeps the
//! last good value for every key it has seen. Entries never expire: a value
//! stays readable until it is overwritten or the whole store is discarded by
//! an engine reset.
//!
//! Values of any type are stored behind an `Arc`, so a read only clones a
//! pointer out of the map and a write replaces the entry in one step.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use moka::sync::Cache as MokaCache;

/// A stored value, type-erased.
type Entry = Arc<dyn Any + Send + Sync>;

/// Thread-safe key → last-known-value map.
///
/// Cloning is cheap and yields a handle to the same entries.
#[derive(Clone)]
pub struct CacheStore {
    entries: MokaCache<String, Entry>,
}

impl CacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        // No capacity or TTL: stale data must stay available.
        Self {
            entries: MokaCache::builder().build(),
        }
    }

    /// Get the value stored under `key`, or `default` if there is none.
    ///
    /// A value stored with a different type than `T` also yields `default`.
    pub fn get<T>(&self, key: &str, default: T) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        self.load(key).unwrap_or(default)
    }

    /// Get the value stored under `key`, if present and of type `T`.
    pub fn load<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entry = self.entries.get(key)?;
        entry.downcast_ref::<T>().cloned()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn put<T>(&self, key: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.entries.insert(key.into(), Arc::new(value));
    }

    /// Whether anything is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove the value stored under `key`.
    pub fn remove(&self, key: &str) {
        self.entries.invalidate(key);
    }

    /// All keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|(k, _)| (*k).clone()).collect();
        keys.sort();
        keys
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.iter().count()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_key_returns_default() {
        let store = CacheStore::new();
        assert_eq!(store.get("speed", 0u32), 0);
        assert!(store.load::<u32>("speed").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn put_overwrites() {
        let store = CacheStore::new();
        store.put("speed", 80u32);
        store.put("speed", 120u32);

        assert_eq!(store.get("speed", 0u32), 120);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn type_mismatch_returns_default() {
        let store = CacheStore::new();
        store.put("speed", 80u32);

        assert_eq!(store.get("speed", String::from("unknown")), "unknown");
        assert_eq!(store.get("speed", 0u32), 80);
    }

    #[test]
    fn stores_json_trees() {
        let store = CacheStore::new();
        store.put("status", json!({"speed": 80, "wagonClass": "SECOND"}));

        let status = store.get("status", json!({}));
        assert_eq!(status["speed"], 80);
    }

    #[test]
    fn remove_and_keys() {
        let store = CacheStore::new();
        store.put("trip", 1u8);
        store.put("status", 2u8);
        assert_eq!(store.keys(), vec!["status".to_string(), "trip".to_string()]);

        store.remove("trip");
        assert!(!store.contains("trip"));
        assert!(store.contains("status"));
        assert_eq!(store.keys(), vec!["status".to_string()]);
    }

    #[test]
    fn clones_share_entries_across_threads() {
        let store = CacheStore::new();
        let writer = store.clone();

        std::thread::spawn(move || {
            for i in 0..100u32 {
                writer.put("counter", i);
            }
        })
        .join()
        .unwrap();

        assert_eq!(store.get("counter", 0u32), 99);
    }
}
