//! Error types for the cache crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use kiln_cas::Digest;
use miette::Diagnostic;
use thiserror::Error;

/// Error type for cache operations
///
/// A cache miss is not an error; lookups report it as `None`.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Failure in the underlying content store
    #[error(transparent)]
    #[diagnostic(transparent)]
    Storage(#[from] kiln_cas::Error),

    /// A computation run through the cache failed
    #[error("Computation for request {request} failed: {message}")]
    #[diagnostic(
        code(kiln::cache::action),
        help("Nothing was cached for this request; the next lookup will miss again")
    )]
    Action {
        /// Hex digest of the request
        request: String,
        /// Error reported by the computation
        message: String,
    },
}

impl Error {
    /// Create a computation failure for `request`
    #[must_use]
    pub fn action(request: &Digest, msg: impl Into<String>) -> Self {
        Self::Action {
            request: request.to_hex(),
            message: msg.into(),
        }
    }

    /// The storage error, if this is one
    #[must_use]
    pub const fn as_storage(&self) -> Option<&kiln_cas::Error> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Action { .. } => None,
        }
    }
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, Error>;
