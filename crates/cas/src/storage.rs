//! Content-addressed storage with structural decomposition
//!
//! [`Storage`] turns [`Value`]s into [`Digest`]s and back. With nesting
//! enabled, every element of a [`Value::Sequence`] or [`Value::Collection`] is
//! stored on its own and the container is stored as a same-shaped node of
//! [`Value::Digest`] references. Compound values that share an element
//! therefore share that element's blob.
//!
//! A second namespace holds mappings from one digest to another. Unlike
//! content, mappings may be overwritten.
//!
//! ## Wire format
//!
//! Each blob is the MessagePack encoding of `(FORMAT_VERSION, Value)`. The
//! digest of a blob is the configured hash of exactly those bytes, so changing
//! the format changes every digest.

use crate::config::{Backend, StoreConfig, private_temp_dir};
use crate::digest::{Digest, HashAlgorithm};
use crate::store::{
    AnyKeyValueStore, DurableEnvironment, DurableKeyValueStore, InMemoryKeyValueStore,
    KeyValueStore, MAPPINGS_NAMESPACE,
};
use crate::value::{Storable, Value};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Version tag written in front of every encoded value
pub const FORMAT_VERSION: u8 = 1;

/// Encode a value into its stored blob
///
/// # Errors
///
/// Returns [`Error::Serialization`] if encoding fails
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    rmp_serde::to_vec(&(FORMAT_VERSION, value))
        .map_err(|e| Error::serialization(format!("Failed to encode value: {e}")))
}

/// Decode a stored blob
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the blob is malformed or was written by
/// another format version
pub fn decode(bytes: &[u8]) -> Result<Value> {
    let (version, value): (u8, Value) = rmp_serde::from_slice(bytes)
        .map_err(|e| Error::serialization(format!("Failed to decode value: {e}")))?;
    if version != FORMAT_VERSION {
        return Err(Error::serialization(format!(
            "Unsupported format version {version}, expected {FORMAT_VERSION}"
        )));
    }
    Ok(value)
}

/// In-process memo tables, one pair per nesting mode
#[derive(Debug, Default)]
struct Memo {
    digests: [RwLock<HashMap<Value, Digest>>; 2],
    values: [RwLock<HashMap<Digest, Value>>; 2],
}

impl Memo {
    fn digest_of(&self, value: &Value, nesting: bool) -> Option<Digest> {
        self.digests[usize::from(nesting)].read().get(value).copied()
    }

    fn value_of(&self, digest: &Digest, nesting: bool) -> Option<Value> {
        self.values[usize::from(nesting)].read().get(digest).cloned()
    }

    fn remember(&self, value: &Value, digest: Digest, nesting: bool) {
        let slot = usize::from(nesting);
        self.digests[slot].write().insert(value.clone(), digest);
        self.values[slot].write().insert(digest, value.clone());
    }
}

/// Content store plus mapping store
#[derive(Debug)]
pub struct Storage<S: KeyValueStore> {
    contents: S,
    mappings: S,
    algorithm: HashAlgorithm,
    memo: Option<Memo>,
}

impl<S: KeyValueStore> Storage<S> {
    /// Build storage over existing stores
    ///
    /// Only `algorithm` and `memoize` are read from `config`.
    #[must_use]
    pub fn with_stores(contents: S, mappings: S, config: &StoreConfig) -> Self {
        Self {
            contents,
            mappings,
            algorithm: config.algorithm,
            memo: config.memoize.then(Memo::default),
        }
    }

    /// Hash algorithm used for content digests
    #[must_use]
    pub const fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// The content namespace
    #[must_use]
    pub const fn content_store(&self) -> &S {
        &self.contents
    }

    /// The mapping namespace
    #[must_use]
    pub const fn mapping_store(&self) -> &S {
        &self.mappings
    }

    /// Store a value and return its digest
    ///
    /// With `nesting`, sequence and collection elements are stored
    /// individually first. Storing content that already exists is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the value cannot be encoded, or a
    /// backend error if the write fails
    pub fn put(&self, value: &Value, nesting: bool) -> Result<Digest> {
        if let Some(digest) = self.memo.as_ref().and_then(|m| m.digest_of(value, nesting)) {
            return Ok(digest);
        }

        let shallow;
        let stored = if nesting && value.is_container() {
            shallow = self.store_elements(value)?;
            &shallow
        } else {
            value
        };

        let blob = encode(stored)?;
        let digest = self.algorithm.digest(&blob);
        let written = self.contents.put(digest.as_bytes(), &blob)?;
        tracing::trace!(
            digest = %digest,
            kind = value.kind_name(),
            bytes = blob.len(),
            written,
            "Stored content"
        );

        if let Some(memo) = &self.memo {
            memo.remember(value, digest, nesting);
        }
        Ok(digest)
    }

    /// Load the value stored under `digest`
    ///
    /// With `nesting`, container elements are resolved recursively.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if nothing is stored under `digest`, or
    /// [`Error::Serialization`] if the stored bytes cannot be decoded
    pub fn get(&self, digest: &Digest, nesting: bool) -> Result<Value> {
        if let Some(value) = self.memo.as_ref().and_then(|m| m.value_of(digest, nesting)) {
            return Ok(value);
        }

        let stored = self
            .contents
            .get_with(digest.as_bytes(), decode)
            .map_err(|e| {
                if e.is_not_found() {
                    Error::InvalidKey { digest: *digest }
                } else {
                    e
                }
            })?;
        let value = if nesting {
            self.resolve_elements(stored)?
        } else {
            stored
        };

        if let Some(memo) = &self.memo {
            memo.remember(&value, *digest, nesting);
        }
        Ok(value)
    }

    /// Store a typed value with nesting
    ///
    /// # Errors
    ///
    /// Same as [`Storage::put`]
    pub fn put_value<T: Storable>(&self, value: &T) -> Result<Digest> {
        self.put(&value.to_value()?, true)
    }

    /// Load a typed value with nesting
    ///
    /// # Errors
    ///
    /// Same as [`Storage::get`], plus [`Error::Serialization`] if the stored
    /// value has the wrong shape for `T`
    pub fn get_value<T: Storable>(&self, digest: &Digest) -> Result<T> {
        T::from_value(self.get(digest, true)?)
    }

    /// Store a value together with the name of its type
    ///
    /// Returns `(value_digest, type_digest)`.
    ///
    /// # Errors
    ///
    /// Same as [`Storage::put`]
    pub fn put_typed<T: Storable>(&self, value: &T) -> Result<(Digest, Digest)> {
        let value_key = self.put_value(value)?;
        let type_key = self.put(&Value::str(std::any::type_name::<T>()), true)?;
        Ok((value_key, type_key))
    }

    /// Load a value stored by [`Storage::put_typed`], checking its type
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the value was stored as another type,
    /// otherwise the same errors as [`Storage::get_value`]
    pub fn get_typed<T: Storable>(&self, value_key: &Digest, type_key: &Digest) -> Result<T> {
        let expected = std::any::type_name::<T>();
        let found = match self.get(type_key, true)? {
            Value::Str(name) => name,
            other => {
                return Err(Error::serialization(format!(
                    "Type key {} holds a {}, not a type name",
                    type_key.to_hex(),
                    other.kind_name()
                )));
            }
        };
        if found != expected {
            return Err(Error::TypeMismatch {
                expected: expected.to_string(),
                found,
            });
        }
        self.get_value(value_key)
    }

    /// Point `from` at `to`, replacing any previous target
    ///
    /// The content addressed by `to` is expected to exist already.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the write fails
    pub fn add_mapping(&self, from: &Digest, to: &Digest) -> Result<()> {
        self.mappings.replace(from.as_bytes(), to.as_bytes())?;
        tracing::trace!(from = %from, to = %to, "Added mapping");
        Ok(())
    }

    /// Current target of `from`, or `None` if it was never mapped
    ///
    /// # Errors
    ///
    /// Returns a backend error, or [`Error::InvalidDigest`] if the stored
    /// target is corrupt
    pub fn get_mapping(&self, from: &Digest) -> Result<Option<Digest>> {
        match self.mappings.get_with(from.as_bytes(), Digest::from_slice) {
            Ok(to) => Ok(Some(to)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Every recorded mapping
    ///
    /// # Errors
    ///
    /// Returns a backend error, or [`Error::InvalidDigest`] for corrupt entries
    pub fn mappings(&self) -> Result<Vec<(Digest, Digest)>> {
        self.mappings
            .items()?
            .into_iter()
            .map(|(from, to)| Ok((Digest::from_slice(&from)?, Digest::from_slice(&to)?)))
            .collect()
    }

    /// Release both stores
    pub fn close(self) {
        tracing::debug!(algorithm = %self.algorithm, "Closing storage");
        drop(self);
    }

    fn store_elements(&self, value: &Value) -> Result<Value> {
        let refs = |items: &[Value]| -> Result<Vec<Value>> {
            items
                .iter()
                .map(|item| self.put(item, true).map(Value::Digest))
                .collect()
        };
        Ok(match value {
            Value::Sequence(items) => Value::Sequence(refs(items)?),
            Value::Collection { kind, items } => Value::Collection {
                kind: kind.clone(),
                items: refs(items)?,
            },
            other => other.clone(),
        })
    }

    fn resolve_elements(&self, stored: Value) -> Result<Value> {
        let resolve = |items: Vec<Value>| -> Result<Vec<Value>> {
            items
                .into_iter()
                .map(|item| match item {
                    Value::Digest(child) => self.get(&child, true),
                    other => Err(Error::serialization(format!(
                        "Container element is a {}, not a reference; was it stored without nesting?",
                        other.kind_name()
                    ))),
                })
                .collect()
        };
        Ok(match stored {
            Value::Sequence(items) => Value::Sequence(resolve(items)?),
            Value::Collection { kind, items } => Value::Collection {
                kind,
                items: resolve(items)?,
            },
            other => other,
        })
    }
}

impl Storage<InMemoryKeyValueStore> {
    /// Storage held entirely in memory with default settings
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_stores(
            InMemoryKeyValueStore::new(),
            InMemoryKeyValueStore::new(),
            &StoreConfig::memory(),
        )
    }
}

impl Storage<DurableKeyValueStore> {
    /// Open durable storage; both namespaces share one database
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened
    pub fn durable(config: &StoreConfig) -> Result<Self> {
        let env = DurableEnvironment::open(config, &[MAPPINGS_NAMESPACE])?;
        let mappings = env.namespace(MAPPINGS_NAMESPACE)?;
        Ok(Self::with_stores(env.main(), mappings, config))
    }

    /// Durable storage in a fresh private temporary directory
    ///
    /// The directory is left in place for the operating system to clean up.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created
    pub fn durable_temp() -> Result<Self> {
        Self::durable(&StoreConfig::durable(private_temp_dir()?))
    }
}

impl Storage<AnyKeyValueStore> {
    /// Open storage on whichever backend `config` selects
    ///
    /// # Errors
    ///
    /// Returns an error if a durable database cannot be opened
    pub fn open(config: &StoreConfig) -> Result<Self> {
        match config.backend {
            Backend::Memory => Ok(Self::with_stores(
                AnyKeyValueStore::Memory(InMemoryKeyValueStore::new()),
                AnyKeyValueStore::Memory(InMemoryKeyValueStore::new()),
                config,
            )),
            Backend::Durable => {
                let env = DurableEnvironment::open(config, &[MAPPINGS_NAMESPACE])?;
                let mappings = env.namespace(MAPPINGS_NAMESPACE)?;
                Ok(Self::with_stores(
                    AnyKeyValueStore::Durable(env.main()),
                    AnyKeyValueStore::Durable(mappings),
                    config,
                ))
            }
        }
    }
}
