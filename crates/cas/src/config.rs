//! Store configuration
//!
//! A [`StoreConfig`] selects the backend, where a durable store lives, its
//! size ceiling and the hash algorithm. It can be built in code or loaded from
//! a TOML file:
//!
//! ```toml
//! backend = "durable"
//! path = "/var/cache/kiln"
//! max_size_bytes = 274877906944
//! algorithm = "sha256"
//! memoize = true
//! sync = false
//! ```

use crate::digest::HashAlgorithm;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default ceiling for durable stores (256 GiB)
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 256 * 1024 * 1024 * 1024;

/// Which key-value backend holds the data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Process-local hash maps
    Memory,
    /// redb database file
    #[default]
    Durable,
}

/// Configuration for a [`Storage`](crate::Storage)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Backend selection
    pub backend: Backend,
    /// Directory of a durable store; a private temporary one when unset
    pub path: Option<PathBuf>,
    /// Writes are refused once the database file is larger than this
    pub max_size_bytes: u64,
    /// Hash function used for content digests
    pub algorithm: HashAlgorithm,
    /// Keep in-process memo tables of recently stored and loaded values
    pub memoize: bool,
    /// Flush every commit to disk before returning
    pub sync: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            path: None,
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            algorithm: HashAlgorithm::default(),
            memoize: true,
            sync: false,
        }
    }
}

impl StoreConfig {
    /// Configuration for an in-memory store
    #[must_use]
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory,
            ..Self::default()
        }
    }

    /// Configuration for a durable store rooted at `path`
    #[must_use]
    pub fn durable(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::Durable,
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Load a configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid configuration
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(e, path, "read"))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the text is not valid configuration
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::configuration(format!("Invalid store configuration: {e}")))
    }

    /// Directory a durable store should use
    ///
    /// An explicit `path` wins. Without one a fresh private directory is
    /// allocated under the system temp dir and left in place afterwards, so
    /// two path-less stores never share content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the temporary directory cannot be created
    pub fn resolve_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => private_temp_dir(),
        }
    }
}

/// Allocate a fresh `kiln-store-*` directory that outlives the process
pub(crate) fn private_temp_dir() -> Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix("kiln-store-")
        .tempdir()
        .map_err(|e| Error::io(e, std::env::temp_dir(), "create_temp_dir"))?
        .keep();
    tracing::debug!(path = %dir.display(), "Allocated private store directory");
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.backend, Backend::Durable);
        assert_eq!(config.max_size_bytes, 256 * (1 << 30));
        assert_eq!(config.algorithm, HashAlgorithm::Sha256);
        assert!(config.memoize);
        assert!(!config.sync);
    }

    #[test]
    fn test_explicit_path_wins() {
        let config = StoreConfig::durable("/some/where");
        assert_eq!(config.resolve_path().unwrap(), PathBuf::from("/some/where"));
    }

    #[test]
    fn test_missing_path_allocates_private_dir() {
        let config = StoreConfig::default();
        let first = config.resolve_path().unwrap();
        let second = config.resolve_path().unwrap();
        assert_ne!(first, second);
        assert!(first.is_dir());
        assert!(
            first
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("kiln-store-")
        );
        fs::remove_dir_all(first).unwrap();
        fs::remove_dir_all(second).unwrap();
    }

    #[test]
    fn test_parse_toml() {
        let config = StoreConfig::from_toml_str(
            r#"
            backend = "memory"
            algorithm = "blake3"
            memoize = false
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.algorithm, HashAlgorithm::Blake3);
        assert!(!config.memoize);
        assert_eq!(config.max_size_bytes, DEFAULT_MAX_SIZE_BYTES);
    }

    #[test]
    fn test_parse_toml_rejects_unknown_fields() {
        let err = StoreConfig::from_toml_str("evict = true").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("kiln.toml");
        fs::write(&file, "path = \"/data/kiln\"\nsync = true\n").unwrap();
        let config = StoreConfig::from_toml_file(&file).unwrap();
        assert_eq!(config.path, Some(PathBuf::from("/data/kiln")));
        assert!(config.sync);
    }
}
