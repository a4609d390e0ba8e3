//! Content-addressed value storage for kiln
//!
//! This crate stores structured [`Value`]s under the digest of their encoded
//! bytes:
//! - [`Digest`]: fixed-width content address with hex and short renderings
//! - [`KeyValueStore`]: write-once binary store, in memory or on disk (redb)
//! - [`Storage`]: value encoding, structural decomposition of containers and
//!   a separate digest-to-digest mapping namespace
//!
//! # Structural sharing
//!
//! Storing `[a, b]` and `[a, c]` with nesting enabled writes the blob for `a`
//! once; both containers hold a reference to it.
//!
//! ```
//! use kiln_cas::{Storage, Value};
//!
//! let storage = Storage::in_memory();
//! let key = storage.put(&Value::Sequence(vec![Value::Int(1), Value::str("two")]), true)?;
//! assert_eq!(
//!     storage.get(&key, true)?,
//!     Value::Sequence(vec![Value::Int(1), Value::str("two")])
//! );
//! # Ok::<(), kiln_cas::Error>(())
//! ```

pub mod config;
pub mod digest;
mod error;
pub mod storage;
pub mod store;
pub mod value;

// Re-export error types at crate root
pub use error::{Error, Result};

// Re-export main types
pub use config::{Backend, StoreConfig};
pub use digest::{DIGEST_LEN, Digest, HashAlgorithm};
pub use storage::Storage;
pub use store::{
    AnyKeyValueStore, DurableEnvironment, DurableKeyValueStore, InMemoryKeyValueStore,
    KeyValueStore,
};
pub use value::{Serde, Storable, Value};
