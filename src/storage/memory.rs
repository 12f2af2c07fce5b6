use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::kv::{KvStore, StoreError};

/// In-process key/value store backed by a sharded concurrent map
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, Vec<u8>>,
    /// Successful writes, for observing store traffic
    writes: AtomicU64,
    /// When set, every call fails with `StoreError::Unavailable`
    offline: AtomicBool,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `set`/`compare_and_set` writes so far
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Simulate an outage of the backing store
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_online()?;
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.check_online()?;
        self.entries.insert(key.to_string(), value.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, StoreError> {
        self.check_online()?;

        // The entry guard holds the shard lock for the whole comparison
        let swapped = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if expected == Some(occupied.get().as_slice()) {
                    occupied.insert(new.to_vec());
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                if expected.is_none() {
                    vacant.insert(new.to_vec());
                    true
                } else {
                    false
                }
            }
        };

        if swapped {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(swapped)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.check_online()?;
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_and_set_absent() {
        let store = MemoryKvStore::new();

        assert!(store.compare_and_set("k", None, b"one").unwrap());
        // Key now exists, so "expect absent" must fail
        assert!(!store.compare_and_set("k", None, b"two").unwrap());
        assert_eq!(store.get("k").unwrap(), Some(b"one".to_vec()));
    }

    #[test]
    fn test_compare_and_set_mismatch() {
        let store = MemoryKvStore::new();
        store.set("k", b"one").unwrap();

        assert!(!store.compare_and_set("k", Some(b"other"), b"two").unwrap());
        assert!(store.compare_and_set("k", Some(b"one"), b"two").unwrap());
        assert_eq!(store.get("k").unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn test_expected_value_on_missing_key() {
        let store = MemoryKvStore::new();
        assert!(!store.compare_and_set("k", Some(b"one"), b"two").unwrap());
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn test_prefix_listing() {
        let store = MemoryKvStore::new();
        store.set("warn_metric_b", b"1").unwrap();
        store.set("warn_metric_a", b"1").unwrap();
        store.set("LastWarnMetricRunTimestamp", b"1").unwrap();

        let keys = store.keys_with_prefix("warn_metric_").unwrap();
        assert_eq!(keys, vec!["warn_metric_a", "warn_metric_b"]);
    }

    #[test]
    fn test_offline() {
        let store = MemoryKvStore::new();
        store.set_offline(true);
        assert!(matches!(store.get("k"), Err(StoreError::Unavailable(_))));
        store.set_offline(false);
        assert!(store.get("k").unwrap().is_none());
    }
}
