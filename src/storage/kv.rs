//! Key/value store boundary

/// Key/value backend holding status records and system values.
///
/// `compare_and_set` must be atomic per key: it replaces the value only if
/// the current value equals `expected` (`None` meaning the key is absent).
pub trait KvStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write a value unconditionally
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Atomically replace `expected` with `new`; false if the current value differs
    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, StoreError>;

    /// List keys starting with `prefix`
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Too much contention on key {0}")]
    Contention(String),
}
