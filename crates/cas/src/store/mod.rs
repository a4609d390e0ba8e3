//! Key-value backends
//!
//! [`KeyValueStore`] is the narrow capability storage builds on. Content
//! entries are write-once: [`KeyValueStore::put`] never overwrites. The
//! mapping namespace additionally needs [`KeyValueStore::replace`].
//!
//! Two backends are provided:
//! - [`InMemoryKeyValueStore`]: a lock-guarded hash map, nothing persisted
//! - [`DurableKeyValueStore`]: a namespace inside a redb database file shared
//!   through a [`DurableEnvironment`]

mod durable;
mod memory;

pub use durable::{CONTENT_NAMESPACE, DurableEnvironment, DurableKeyValueStore, MAPPINGS_NAMESPACE};
pub use memory::InMemoryKeyValueStore;

use crate::Result;

/// Binary key to binary value store with write-once `put`
pub trait KeyValueStore: Send + Sync {
    /// Look up `key` and pass the stored bytes through `transform`
    ///
    /// The slice handed to `transform` is only valid for the duration of the
    /// call; anything that must outlive it has to be copied or decoded there.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`](crate::Error::KeyNotFound) if the key is
    /// absent, any error produced by `transform`, or a backend error
    fn get_with<T, F>(&self, key: &[u8], transform: F) -> Result<T>
    where
        F: FnOnce(&[u8]) -> Result<T>;

    /// Look up `key` and return an owned copy of its value
    ///
    /// # Errors
    ///
    /// Same as [`KeyValueStore::get_with`]
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.get_with(key, |bytes| Ok(bytes.to_vec()))
    }

    /// Store `value` under `key` unless the key already exists
    ///
    /// Returns `true` if the value was written and `false` if the key was
    /// already present, in which case the stored value is left untouched.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the write could not be performed
    fn put(&self, key: &[u8], value: &[u8]) -> Result<bool>;

    /// Store `value` under `key`, overwriting any previous value
    ///
    /// # Errors
    ///
    /// Returns a backend error if the write could not be performed
    fn replace(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Every entry in the store, in no particular order
    ///
    /// # Errors
    ///
    /// Returns a backend error if enumeration fails
    fn items(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Number of entries in the store
    ///
    /// # Errors
    ///
    /// Returns a backend error if the count cannot be read
    fn len(&self) -> Result<u64>;

    /// Whether the store holds no entries
    ///
    /// # Errors
    ///
    /// Returns a backend error if the count cannot be read
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Backend chosen at runtime from a [`StoreConfig`](crate::StoreConfig)
#[derive(Debug)]
pub enum AnyKeyValueStore {
    /// Process-local store
    Memory(InMemoryKeyValueStore),
    /// Namespace of a redb database
    Durable(DurableKeyValueStore),
}

impl KeyValueStore for AnyKeyValueStore {
    fn get_with<T, F>(&self, key: &[u8], transform: F) -> Result<T>
    where
        F: FnOnce(&[u8]) -> Result<T>,
    {
        match self {
            Self::Memory(store) => store.get_with(key, transform),
            Self::Durable(store) => store.get_with(key, transform),
        }
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        match self {
            Self::Memory(store) => store.put(key, value),
            Self::Durable(store) => store.put(key, value),
        }
    }

    fn replace(&self, key: &[u8], value: &[u8]) -> Result<()> {
        match self {
            Self::Memory(store) => store.replace(key, value),
            Self::Durable(store) => store.replace(key, value),
        }
    }

    fn items(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        match self {
            Self::Memory(store) => store.items(),
            Self::Durable(store) => store.items(),
        }
    }

    fn len(&self) -> Result<u64> {
        match self {
            Self::Memory(store) => store.len(),
            Self::Durable(store) => store.len(),
        }
    }
}
