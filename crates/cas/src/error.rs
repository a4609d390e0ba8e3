//! Error types for the content-addressed store

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

use crate::digest::Digest;

/// Error type for content-addressed storage operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Bytes of the wrong length were offered as a digest
    #[error("Invalid digest: expected {expected} bytes, got {actual}")]
    #[diagnostic(
        code(kiln::cas::invalid_digest),
        help("Digests must be built from the raw output of the hash function")
    )]
    InvalidDigest {
        /// Required digest length in bytes
        expected: usize,
        /// Length of the rejected input
        actual: usize,
    },

    /// A digest rendering is not hexadecimal
    #[error("Invalid hex digest '{input}': {reason}")]
    #[diagnostic(
        code(kiln::cas::invalid_hex),
        help("Digests are written as 64 hex characters")
    )]
    InvalidHex {
        /// The rejected text
        input: String,
        /// Why decoding failed
        reason: String,
    },

    /// A key-value store has no entry for the requested key
    #[error("Key not found: {key}")]
    #[diagnostic(code(kiln::cas::key_not_found))]
    KeyNotFound {
        /// Hex rendering of the missing key
        key: String,
    },

    /// Storage was asked for content it never stored
    #[error("No content stored under digest {}", digest.to_hex())]
    #[diagnostic(
        code(kiln::cas::invalid_key),
        help("The store directory may have been wiped, or the digest was not produced by this store")
    )]
    InvalidKey {
        /// The digest that did not resolve
        digest: Digest,
    },

    /// A value could not be encoded or decoded
    #[error("Serialization error: {message}")]
    #[diagnostic(code(kiln::cas::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },

    /// A typed lookup found a value stored under a different type
    #[error("Type mismatch: expected {expected}, stored value is {found}")]
    #[diagnostic(code(kiln::cas::type_mismatch))]
    TypeMismatch {
        /// Type requested by the caller
        expected: String,
        /// Type recorded at store time
        found: String,
    },

    /// Failure reported by the durable storage engine
    #[error("Durable store {operation} failed")]
    #[diagnostic(code(kiln::cas::durable))]
    Durable {
        /// The underlying engine error
        #[source]
        source: Box<redb::Error>,
        /// Operation that failed (e.g., "begin_write", "insert", "commit")
        operation: String,
    },

    /// The durable store grew past its configured ceiling
    #[error("Durable store at {} is full: {size} bytes used, limit {limit}", path.display())]
    #[diagnostic(
        code(kiln::cas::store_full),
        help("Raise max_size_bytes in the store configuration or point the store at a fresh directory")
    )]
    StoreFull {
        /// Path of the database file
        path: Box<Path>,
        /// Current size of the database file
        size: u64,
        /// Configured ceiling
        limit: u64,
    },

    /// I/O error while preparing the store
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(kiln::cas::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "create_dir_all")
        operation: String,
    },

    /// Configuration or validation error
    #[error("Store configuration error: {message}")]
    #[diagnostic(code(kiln::cas::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },
}

impl Error {
    /// Create an invalid digest error
    #[must_use]
    pub fn invalid_digest(expected: usize, actual: usize) -> Self {
        Self::InvalidDigest { expected, actual }
    }

    /// Create an invalid hex error
    #[must_use]
    pub fn invalid_hex(input: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::InvalidHex {
            input: input.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a key-not-found error for a raw store key
    #[must_use]
    pub fn key_not_found(key: &[u8]) -> Self {
        Self::KeyNotFound {
            key: hex::encode(key),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a durable-engine error
    #[must_use]
    pub fn durable(source: impl Into<redb::Error>, operation: impl Into<String>) -> Self {
        Self::Durable {
            source: Box::new(source.into()),
            operation: operation.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Whether this error reports a missing key at the key-value layer
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }
}

/// Result type for content-addressed storage operations
pub type Result<T> = std::result::Result<T, Error>;
