//! Process-local key-value store

use super::KeyValueStore;
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Hash map backed store, lost when dropped
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryKeyValueStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get_with<T, F>(&self, key: &[u8], transform: F) -> Result<T>
    where
        F: FnOnce(&[u8]) -> Result<T>,
    {
        let entries = self.entries.read();
        let value = entries.get(key).ok_or_else(|| Error::key_not_found(key))?;
        transform(value)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let mut entries = self.entries.write();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_vec(), value.to_vec());
        Ok(true)
    }

    fn replace(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn items(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.entries.read().len() as u64)
    }
}
