//! Computation result cache for kiln
//!
//! This crate answers "has this unit of work already been done?":
//! - Requests and results are stored as content-addressed values
//! - A request's digest maps to the digest of its latest result
//! - Every lookup is counted as a hit or a miss
//!
//! # Overview
//!
//! ```
//! use kiln_cache::Cache;
//! use kiln_cas::Value;
//!
//! let cache = Cache::in_memory();
//! let runnable = Value::Sequence(vec![Value::str("compile"), Value::str("Foo.java")]);
//!
//! let (key, miss) = cache.get(&runnable)?;
//! assert!(miss.is_none());
//! cache.put(&key, &Value::str("Foo.class"))?;
//!
//! let (_, hit) = cache.get(&runnable)?;
//! assert_eq!(hit, Some(Value::str("Foo.class")));
//! assert_eq!(cache.stats().snapshot().to_string(), "hits=1 misses=1 total=2");
//! # Ok::<(), kiln_cache::Error>(())
//! ```

// TODO(cache-docs): Add # Errors documentation to all fallible public functions
#![expect(
    clippy::missing_errors_doc,
    reason = "Error documentation to be added incrementally"
)]

mod cache;
mod error;
pub mod stats;

// Re-export error types at crate root
pub use error::{Error, Result};

// Re-export main types
pub use cache::Cache;
pub use stats::{CacheStats, CacheStatsSnapshot};
