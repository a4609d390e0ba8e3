//! Durable key-value store backed by redb
//!
//! One database file holds every namespace. A [`DurableEnvironment`] owns the
//! open database; each [`DurableKeyValueStore`] is a cheap handle onto one
//! table inside it. The database is closed when the last handle is dropped.
//!
//! ## Layout
//!
//! ```text
//! <dir>/
//!   store.redb   (tables: "content", "mappings", ...)
//! ```
//!
//! Every operation runs in its own transaction. Transactions are dropped, and
//! therefore aborted, on every early return, so a failed write never leaves a
//! partial update behind.

use super::KeyValueStore;
use crate::config::StoreConfig;
use crate::{Error, Result};
use redb::{Database, Durability, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the main namespace holding content blobs
pub const CONTENT_NAMESPACE: &str = "content";

/// Name of the child namespace holding request-to-result mappings
pub const MAPPINGS_NAMESPACE: &str = "mappings";

const DATABASE_FILE: &str = "store.redb";

type BytesTable<'a> = TableDefinition<'a, &'static [u8], &'static [u8]>;

struct Environment {
    db: Database,
    file: PathBuf,
    namespaces: Vec<String>,
    max_size_bytes: u64,
    durability: Durability,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("file", &self.file)
            .field("namespaces", &self.namespaces)
            .field("max_size_bytes", &self.max_size_bytes)
            .finish_non_exhaustive()
    }
}

/// An open database shared by all of its namespaces
#[derive(Debug, Clone)]
pub struct DurableEnvironment {
    inner: Arc<Environment>,
}

impl DurableEnvironment {
    /// Open (or create) the database described by `config`
    ///
    /// The main namespace is always created; `children` lists the additional
    /// namespaces to create alongside it. Only namespaces created here can be
    /// handed out later.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened
    pub fn open(config: &StoreConfig, children: &[&str]) -> Result<Self> {
        let dir = config.resolve_path()?;
        fs::create_dir_all(&dir).map_err(|e| Error::io(e, &dir, "create_dir_all"))?;
        let file = dir.join(DATABASE_FILE);

        let db = Database::create(&file).map_err(|e| Error::durable(e, "open"))?;

        let mut namespaces = vec![CONTENT_NAMESPACE.to_string()];
        for name in children {
            if !namespaces.iter().any(|n| n == *name) {
                namespaces.push((*name).to_string());
            }
        }

        let txn = db.begin_write().map_err(|e| Error::durable(e, "begin_write"))?;
        for name in &namespaces {
            txn.open_table(BytesTable::new(name))
                .map_err(|e| Error::durable(e, "create_table"))?;
        }
        txn.commit().map_err(|e| Error::durable(e, "commit"))?;

        tracing::info!(
            path = %file.display(),
            namespaces = ?namespaces,
            max_size_bytes = config.max_size_bytes,
            "Opened durable store"
        );

        Ok(Self {
            inner: Arc::new(Environment {
                db,
                file,
                namespaces,
                max_size_bytes: config.max_size_bytes,
                durability: if config.sync {
                    Durability::Immediate
                } else {
                    Durability::Eventual
                },
            }),
        })
    }

    /// Handle onto the main namespace
    #[must_use]
    pub fn main(&self) -> DurableKeyValueStore {
        DurableKeyValueStore {
            env: self.clone(),
            namespace: CONTENT_NAMESPACE.to_string(),
        }
    }

    /// Handle onto a child namespace created at open time
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `name` was not created by [`DurableEnvironment::open`]
    pub fn namespace(&self, name: &str) -> Result<DurableKeyValueStore> {
        if !self.inner.namespaces.iter().any(|n| n == name) {
            return Err(Error::configuration(format!(
                "Namespace '{name}' was not opened with the environment"
            )));
        }
        Ok(DurableKeyValueStore {
            env: self.clone(),
            namespace: name.to_string(),
        })
    }

    /// Path of the database file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.file
    }

    fn ensure_capacity(&self) -> Result<()> {
        let file = &self.inner.file;
        let size = fs::metadata(file)
            .map_err(|e| Error::io(e, file, "metadata"))?
            .len();
        if size > self.inner.max_size_bytes {
            tracing::warn!(
                path = %file.display(),
                size,
                limit = self.inner.max_size_bytes,
                "Refusing write to full durable store"
            );
            return Err(Error::StoreFull {
                path: file.as_path().into(),
                size,
                limit: self.inner.max_size_bytes,
            });
        }
        Ok(())
    }
}

/// One namespace of a [`DurableEnvironment`]
#[derive(Debug, Clone)]
pub struct DurableKeyValueStore {
    env: DurableEnvironment,
    namespace: String,
}

impl DurableKeyValueStore {
    /// Open a standalone store holding only the main namespace
    ///
    /// # Errors
    ///
    /// Same as [`DurableEnvironment::open`]
    pub fn open(config: &StoreConfig) -> Result<Self> {
        Ok(DurableEnvironment::open(config, &[])?.main())
    }

    /// Name of the namespace this handle reads and writes
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Environment this namespace lives in
    #[must_use]
    pub const fn environment(&self) -> &DurableEnvironment {
        &self.env
    }

    fn table(&self) -> BytesTable<'_> {
        TableDefinition::new(&self.namespace)
    }

    /// Run `op` in a write transaction; `None` from `op` aborts instead of committing
    fn write<T>(
        &self,
        op: impl FnOnce(&mut redb::Table<'_, &'static [u8], &'static [u8]>) -> Result<Option<T>>,
    ) -> Result<Option<T>> {
        self.env.ensure_capacity()?;
        let mut txn = self
            .env
            .inner
            .db
            .begin_write()
            .map_err(|e| Error::durable(e, "begin_write"))?;
        txn.set_durability(self.env.inner.durability);
        let outcome = {
            let mut table = txn
                .open_table(self.table())
                .map_err(|e| Error::durable(e, "open_table"))?;
            op(&mut table)?
        };
        match outcome {
            Some(value) => {
                txn.commit().map_err(|e| Error::durable(e, "commit"))?;
                Ok(Some(value))
            }
            None => {
                txn.abort().map_err(|e| Error::durable(e, "abort"))?;
                Ok(None)
            }
        }
    }
}

impl KeyValueStore for DurableKeyValueStore {
    fn get_with<T, F>(&self, key: &[u8], transform: F) -> Result<T>
    where
        F: FnOnce(&[u8]) -> Result<T>,
    {
        let txn = self
            .env
            .inner
            .db
            .begin_read()
            .map_err(|e| Error::durable(e, "begin_read"))?;
        let table = txn
            .open_table(self.table())
            .map_err(|e| Error::durable(e, "open_table"))?;
        let guard = table
            .get(key)
            .map_err(|e| Error::durable(e, "get"))?
            .ok_or_else(|| Error::key_not_found(key))?;
        transform(guard.value())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let written = self.write(|table| {
            if table
                .get(key)
                .map_err(|e| Error::durable(e, "get"))?
                .is_some()
            {
                return Ok(None);
            }
            table
                .insert(key, value)
                .map_err(|e| Error::durable(e, "insert"))?;
            Ok(Some(()))
        })?;
        tracing::trace!(
            namespace = %self.namespace,
            key = %hex::encode(key),
            written = written.is_some(),
            "put"
        );
        Ok(written.is_some())
    }

    fn replace(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write(|table| {
            table
                .insert(key, value)
                .map_err(|e| Error::durable(e, "insert"))?;
            Ok(Some(()))
        })?;
        Ok(())
    }

    fn items(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let txn = self
            .env
            .inner
            .db
            .begin_read()
            .map_err(|e| Error::durable(e, "begin_read"))?;
        let table = txn
            .open_table(self.table())
            .map_err(|e| Error::durable(e, "open_table"))?;
        let mut items = Vec::new();
        for entry in table.iter().map_err(|e| Error::durable(e, "iter"))? {
            let (key, value) = entry.map_err(|e| Error::durable(e, "iter"))?;
            items.push((key.value().to_vec(), value.value().to_vec()));
        }
        Ok(items)
    }

    fn len(&self) -> Result<u64> {
        let txn = self
            .env
            .inner
            .db
            .begin_read()
            .map_err(|e| Error::durable(e, "begin_read"))?;
        let table = txn
            .open_table(self.table())
            .map_err(|e| Error::durable(e, "open_table"))?;
        table.len().map_err(|e| Error::durable(e, "len"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;
    use tempfile::TempDir;

    fn open(tmp: &TempDir) -> DurableKeyValueStore {
        DurableKeyValueStore::open(&StoreConfig::durable(tmp.path())).unwrap()
    }

    #[test]
    fn test_write_once() {
        let tmp = TempDir::new().unwrap();
        contract::write_once(&open(&tmp));
    }

    #[test]
    fn test_miss() {
        let tmp = TempDir::new().unwrap();
        contract::miss_is_not_found(&open(&tmp));
    }

    #[test]
    fn test_empty_value() {
        let tmp = TempDir::new().unwrap();
        contract::empty_value_is_found(&open(&tmp));
    }

    #[test]
    fn test_replace() {
        let tmp = TempDir::new().unwrap();
        contract::replace_overwrites(&open(&tmp));
    }

    #[test]
    fn test_transform_error() {
        let tmp = TempDir::new().unwrap();
        contract::transform_errors_propagate(&open(&tmp));
    }

    #[test]
    fn test_items() {
        let tmp = TempDir::new().unwrap();
        contract::items_enumerates_everything(&open(&tmp));
    }

    #[test]
    fn test_layout_on_disk() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp);
        assert_eq!(store.environment().path(), tmp.path().join("store.redb"));
        assert!(tmp.path().join("store.redb").is_file());
    }

    #[test]
    fn test_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = open(&tmp);
            assert!(store.put(b"key", b"value").unwrap());
        }
        let store = open(&tmp);
        assert_eq!(store.get(b"key").unwrap(), b"value");
        assert!(!store.put(b"key", b"other").unwrap());
    }

    #[test]
    fn test_synchronous_commits() {
        let tmp = TempDir::new().unwrap();
        let mut config = StoreConfig::durable(tmp.path());
        config.sync = true;
        {
            let store = DurableKeyValueStore::open(&config).unwrap();
            assert!(store.put(b"key", b"flushed").unwrap());
            store.replace(b"other", b"also flushed").unwrap();
        }
        let store = DurableKeyValueStore::open(&config).unwrap();
        assert_eq!(store.get(b"key").unwrap(), b"flushed");
        assert_eq!(store.get(b"other").unwrap(), b"also flushed");
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let env = DurableEnvironment::open(&StoreConfig::durable(tmp.path()), &[MAPPINGS_NAMESPACE])
            .unwrap();
        let content = env.main();
        let mappings = env.namespace(MAPPINGS_NAMESPACE).unwrap();

        content.put(b"k", b"content").unwrap();
        mappings.replace(b"k", b"mapping").unwrap();

        assert_eq!(content.get(b"k").unwrap(), b"content");
        assert_eq!(mappings.get(b"k").unwrap(), b"mapping");
        assert_eq!(content.len().unwrap(), 1);
        assert_eq!(mappings.len().unwrap(), 1);
    }

    #[test]
    fn test_unknown_namespace_rejected() {
        let tmp = TempDir::new().unwrap();
        let env = DurableEnvironment::open(&StoreConfig::durable(tmp.path()), &[]).unwrap();
        assert!(matches!(
            env.namespace("extra"),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_size_ceiling_refuses_writes() {
        let tmp = TempDir::new().unwrap();
        let mut config = StoreConfig::durable(tmp.path());
        config.max_size_bytes = 1;
        let store = DurableKeyValueStore::open(&config).unwrap();

        let err = store.put(b"k", b"v").unwrap_err();
        assert!(matches!(err, Error::StoreFull { limit: 1, .. }));
        // Reads still work on a full store
        assert!(store.get(b"k").unwrap_err().is_not_found());
    }

    #[test]
    fn test_handles_share_one_database() {
        let tmp = TempDir::new().unwrap();
        let env = DurableEnvironment::open(&StoreConfig::durable(tmp.path()), &[MAPPINGS_NAMESPACE])
            .unwrap();
        let a = env.main();
        let b = a.clone();
        a.put(b"x", b"1").unwrap();
        assert_eq!(b.get(b"x").unwrap(), b"1");
        assert_eq!(Arc::strong_count(&env.inner), 3);
        drop((a, b));
        assert_eq!(Arc::strong_count(&env.inner), 1);
    }

    #[test]
    fn test_concurrent_writers_keep_first_value() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp);
        let written: Vec<bool> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4u8)
                .map(|i| {
                    let store = store.clone();
                    s.spawn(move || store.put(b"shared", &[i]).unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(written.iter().filter(|w| **w).count(), 1);
    }
}
