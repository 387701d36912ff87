//! KeyValueStore implementation
//!
//! HashMap-based store with RwLock for concurrency.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{LedgerError, Result};

/// In-memory key-value map
#[derive(Debug, Default)]
pub struct KeyValueStore {
    data: RwLock<HashMap<String, String>>,
}

impl KeyValueStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value by key (read lock)
    pub fn get(&self, key: &str) -> Result<String> {
        self.data
            .read()
            .get(key)
            .cloned()
            .ok_or(LedgerError::KeyNotFound)
    }

    /// Whether `key` is present (read lock)
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Insert or overwrite a value (write lock)
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.data.write().insert(key.into(), value.into());
    }

    /// Remove a key (write lock).
    ///
    /// Returns `KeyNotFound` without mutating anything when the key is absent.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.data
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or(LedgerError::KeyNotFound)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.data.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_overwrites() {
        let store = KeyValueStore::new();
        store.put("a", "1");
        store.put("a", "2");

        assert_eq!(store.get("a").unwrap(), "2");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_key_is_not_found_and_not_mutating() {
        let store = KeyValueStore::new();
        store.put("present", "x");

        assert!(matches!(store.get("missing"), Err(LedgerError::KeyNotFound)));
        assert!(matches!(store.delete("missing"), Err(LedgerError::KeyNotFound)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_delete_removes() {
        let store = KeyValueStore::new();
        store.put("a", "1");
        store.delete("a").unwrap();

        assert!(store.is_empty());
        assert!(store.get("a").is_err());
        assert!(!store.contains_key("a"));
    }
}
