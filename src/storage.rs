//! In-memory key-value store.
//!
//! The store is owned by the event loop and handed to the dispatcher by
//! mutable reference, so it needs no interior locking.

use bytes::Bytes;
use std::collections::HashMap;
use tracing::info;

/// Byte-string key to byte-string value mapping.
#[derive(Debug, Default)]
pub struct Store {
    data: HashMap<Bytes, Bytes>,
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        info!("Initializing storage");
        Self::default()
    }

    /// Get a value. Cloning `Bytes` only bumps a reference count.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.data.get(key).cloned()
    }

    /// Insert or replace a value
    pub fn set(&mut self, key: Bytes, value: Bytes) {
        self.data.insert(key, value);
    }

    /// Remove a key, returning whether it was present
    pub fn delete(&mut self, key: &[u8]) -> bool {
        self.data.remove(key).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let mut store = Store::new();
        assert_eq!(store.len(), 0);

        store.set(Bytes::from_static(b"key"), Bytes::from_static(b"value"));
        assert_eq!(store.get(b"key"), Some(Bytes::from_static(b"value")));
        assert_eq!(store.len(), 1);

        assert!(store.delete(b"key"));
        assert!(!store.delete(b"key"));
        assert_eq!(store.get(b"key"), None);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_binary_keys() {
        let mut store = Store::new();
        let key = Bytes::from_static(&[0, 159, 146, 150]);
        store.set(key.clone(), Bytes::from_static(b"\0\0"));
        assert_eq!(store.get(&key), Some(Bytes::from_static(b"\0\0")));
    }
}
