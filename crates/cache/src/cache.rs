//! Request to result cache over content-addressed storage
//!
//! A request (runnable) is stored like any other value; its digest is the
//! request key. A result is stored the same way and linked from the request
//! key through the storage's mapping namespace.
//!
//! [`Cache::get`] followed by [`Cache::put`] is not atomic: two callers that
//! miss on the same request both compute and both write, and the later
//! mapping wins. [`Cache::get_or_compute`] closes that window for callers
//! sharing one `Cache` by leasing the request key for the duration of the
//! computation.

use crate::{CacheStats, Error, Result};
use kiln_cas::{Digest, InMemoryKeyValueStore, KeyValueStore, Storable, Storage, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Lease = Arc<Mutex<()>>;

/// Cache of computation results keyed by request
pub struct Cache<S: KeyValueStore> {
    storage: Arc<Storage<S>>,
    stats: CacheStats,
    in_flight: Mutex<HashMap<Digest, Lease>>,
}

impl<S: KeyValueStore + fmt::Debug> fmt::Debug for Cache<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("storage", &self.storage)
            .field("stats", &self.stats)
            .field("in_flight", &self.in_flight.lock().len())
            .finish()
    }
}

impl<S: KeyValueStore> Cache<S> {
    /// Create a cache over `storage` with zeroed statistics
    #[must_use]
    pub fn new(storage: Arc<Storage<S>>) -> Self {
        Self {
            storage,
            stats: CacheStats::new(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// The storage this cache writes to
    #[must_use]
    pub const fn storage(&self) -> &Arc<Storage<S>> {
        &self.storage
    }

    /// Hit and miss counters
    #[must_use]
    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Look up the result cached for `runnable`
    ///
    /// The request is stored as a side effect, so the returned key can be
    /// passed straight to [`Cache::put`] after a miss.
    pub fn get(&self, runnable: &Value) -> Result<(Digest, Option<Value>)> {
        let request_key = self.storage.put(runnable, true)?;
        let result = self.get_for_key(&request_key)?;
        Ok((request_key, result))
    }

    /// Look up the result cached under an already-computed request key
    pub fn get_for_key(&self, request_key: &Digest) -> Result<Option<Value>> {
        let Some(result_key) = self.storage.get_mapping(request_key)? else {
            self.stats.add_miss();
            tracing::debug!(
                request = %request_key,
                metric = "kiln_cache_miss_total",
                "Cache miss"
            );
            return Ok(None);
        };
        self.stats.add_hit();
        tracing::debug!(
            request = %request_key,
            result = %result_key,
            metric = "kiln_cache_hit_total",
            "Cache hit"
        );
        Ok(Some(self.storage.get(&result_key, true)?))
    }

    /// Store `result` and record it as the answer for `request_key`
    ///
    /// Returns the digest of the stored result. A previous result for the
    /// same request is replaced.
    pub fn put(&self, request_key: &Digest, result: &Value) -> Result<Digest> {
        let result_key = self.storage.put(result, true)?;
        self.storage.add_mapping(request_key, &result_key)?;
        tracing::debug!(request = %request_key, result = %result_key, "Cached result");
        Ok(result_key)
    }

    /// Every cached `(request, result)` pair
    pub fn items(&self) -> Result<Vec<(Value, Value)>> {
        self.storage
            .mappings()?
            .into_iter()
            .map(|(request_key, result_key)| {
                Ok((
                    self.storage.get(&request_key, true)?,
                    self.storage.get(&result_key, true)?,
                ))
            })
            .collect()
    }

    /// Typed form of [`Cache::get`]
    pub fn get_value<R: Storable, T: Storable>(&self, runnable: &R) -> Result<(Digest, Option<T>)> {
        let (request_key, result) = self.get(&runnable.to_value()?)?;
        let result = result.map(T::from_value).transpose()?;
        Ok((request_key, result))
    }

    /// Typed form of [`Cache::put`]
    pub fn put_value<T: Storable>(&self, request_key: &Digest, result: &T) -> Result<Digest> {
        self.put(request_key, &result.to_value()?)
    }

    /// Return the cached result for `runnable`, computing and caching it on a miss
    ///
    /// Concurrent callers asking for the same request through this cache wait
    /// for the first one; they then see its result as a hit. A failed
    /// computation caches nothing and is reported as [`Error::Action`].
    pub fn get_or_compute<F, E>(&self, runnable: &Value, compute: F) -> Result<(Digest, Value)>
    where
        F: FnOnce() -> std::result::Result<Value, E>,
        E: fmt::Display,
    {
        let request_key = self.storage.put(runnable, true)?;
        let lease = self.lease(&request_key);
        let outcome = {
            let _held = lease.lock();
            self.compute_if_absent(&request_key, compute)
        };
        drop(lease);
        self.release(&request_key);
        outcome.map(|result| (request_key, result))
    }

    fn compute_if_absent<F, E>(&self, request_key: &Digest, compute: F) -> Result<Value>
    where
        F: FnOnce() -> std::result::Result<Value, E>,
        E: fmt::Display,
    {
        if let Some(result) = self.get_for_key(request_key)? {
            return Ok(result);
        }
        let result = compute().map_err(|e| {
            tracing::warn!(request = %request_key, error = %e, "Computation failed");
            Error::action(request_key, e.to_string())
        })?;
        self.put(request_key, &result)?;
        Ok(result)
    }

    fn lease(&self, request_key: &Digest) -> Lease {
        Arc::clone(self.in_flight.lock().entry(*request_key).or_default())
    }

    fn release(&self, request_key: &Digest) {
        let mut in_flight = self.in_flight.lock();
        // Only the table still holds the lease once every caller has finished
        if in_flight
            .get(request_key)
            .is_some_and(|lease| Arc::strong_count(lease) == 1)
        {
            in_flight.remove(request_key);
        }
    }
}

impl Cache<InMemoryKeyValueStore> {
    /// Cache over fresh in-memory storage
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(Storage::in_memory()))
    }
}
