//! JSON-file key/value store for surviving restarts
//!
//! The whole map is rewritten to a temporary file and renamed over the
//! target on every write, so a crash leaves either the old or the new map.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::kv::{KvStore, StoreError};

pub struct FileKvStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileKvStore {
    /// Open a store file, creating an empty store if it does not exist
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let entries = match std::fs::read(&path) {
            Ok(data) if data.is_empty() => BTreeMap::new(),
            Ok(data) => serde_json::from_slice(&data)
                .map_err(|e| StoreError::Encoding(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::Io(e)),
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "Opened file store");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let data = serde_json::to_vec_pretty(entries)
            .map_err(|e| StoreError::Encoding(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn to_text(key: &str, value: &[u8]) -> Result<String, StoreError> {
    String::from_utf8(value.to_vec())
        .map_err(|_| StoreError::Encoding(format!("value for {} is not UTF-8", key)))
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.lock();
        Ok(entries.get(key).map(|v| v.as_bytes().to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let value = to_text(key, value)?;
        let mut entries = self.entries.lock();
        let previous = entries.insert(key.to_string(), value);

        if let Err(e) = self.flush(&entries) {
            // Keep memory consistent with disk
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, StoreError> {
        let new = to_text(key, new)?;
        let mut entries = self.entries.lock();

        if entries.get(key).map(|v| v.as_bytes()) != expected {
            return Ok(false);
        }

        let previous = entries.insert(key.to_string(), new);
        if let Err(e) = self.flush(&entries) {
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(true)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.lock();
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        {
            let store = FileKvStore::open(&path).unwrap();
            store.set("warn_metric_a", br#"{"acked":true}"#).unwrap();
            assert!(store
                .compare_and_set("warn_metric_b", None, b"first")
                .unwrap());
        }

        let store = FileKvStore::open(&path).unwrap();
        assert_eq!(
            store.get("warn_metric_a").unwrap(),
            Some(br#"{"acked":true}"#.to_vec())
        );
        assert_eq!(store.get("warn_metric_b").unwrap(), Some(b"first".to_vec()));
        assert_eq!(
            store.keys_with_prefix("warn_metric_").unwrap(),
            vec!["warn_metric_a", "warn_metric_b"]
        );
    }

    #[test]
    fn test_compare_and_set_mismatch_does_not_write() {
        let dir = TempDir::new().unwrap();
        let store = FileKvStore::open(dir.path().join("state.json")).unwrap();

        store.set("k", b"one").unwrap();
        assert!(!store.compare_and_set("k", Some(b"two"), b"three").unwrap());
        assert_eq!(store.get("k").unwrap(), Some(b"one".to_vec()));
    }

    #[test]
    fn test_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"not json").unwrap();

        assert!(matches!(
            FileKvStore::open(&path),
            Err(StoreError::Encoding(_))
        ));
    }

    #[test]
    fn test_rejects_binary_values() {
        let dir = TempDir::new().unwrap();
        let store = FileKvStore::open(dir.path().join("state.json")).unwrap();
        assert!(matches!(
            store.set("k", &[0xff, 0xfe]),
            Err(StoreError::Encoding(_))
        ));
    }
}
