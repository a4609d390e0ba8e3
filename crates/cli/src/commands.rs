//! Command implementations
//!
//! Every command opens storage from the resolved configuration, does its work
//! and returns an [`Output`] holding both the JSON payload and the plain-text
//! rendering. Printing is left to the caller.

use crate::cli::{CliError, Commands};
use kiln_cache::Cache;
use kiln_cas::{AnyKeyValueStore, Digest, KeyValueStore, Storage, StoreConfig, Value};
use serde::Serialize;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Storage shared between commands and the cache
pub type Shared = Arc<Storage<AnyKeyValueStore>>;

/// Result of a command, ready to print in either output mode
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    /// Payload for the JSON envelope
    pub data: serde_json::Value,
    /// Plain-text rendering
    pub text: String,
}

impl Output {
    fn new(data: impl Serialize, text: impl Into<String>) -> Result<Self, CliError> {
        Ok(Self {
            data: serde_json::to_value(data)
                .map_err(|e| CliError::store(format!("Failed to render output: {e}")))?,
            text: text.into(),
        })
    }
}

/// Entry counts of a store
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// Database file, for durable stores
    pub path: Option<PathBuf>,
    /// Entries in the content namespace
    pub content_entries: u64,
    /// Entries in the mapping namespace
    pub mappings: u64,
}

/// One request to result mapping
#[derive(Debug, Clone, Serialize)]
pub struct MappingEntry {
    /// Hex digest of the request
    pub from: String,
    /// Hex digest of the result
    pub to: String,
}

/// Outcome of a cache lookup
#[derive(Debug, Clone, Serialize)]
pub struct LookupReport {
    /// Hex digest of the request
    pub request: String,
    /// Cached result, if any
    pub result: Option<serde_json::Value>,
}

/// Build the store configuration from the command line
///
/// `--store` wins over the configuration file and always selects a durable
/// store.
///
/// # Errors
///
/// Returns an error if the configuration file cannot be loaded
pub fn resolve_config(
    config_file: Option<&Path>,
    store_dir: Option<&Path>,
) -> Result<StoreConfig, CliError> {
    let mut config = match config_file {
        Some(path) => StoreConfig::from_toml_file(path)?,
        None => StoreConfig::default(),
    };
    if let Some(dir) = store_dir {
        config.path = Some(dir.to_path_buf());
        config.backend = kiln_cas::Backend::Durable;
    }
    if config.backend == kiln_cas::Backend::Durable && config.path.is_none() {
        config.path = Some(default_store_dir()?);
    }
    tracing::debug!(config = ?config, "Resolved store configuration");
    Ok(config)
}

/// Environment variable naming the default store directory
pub const STORE_DIR_ENV: &str = "KILN_STORE_DIR";

/// Per-user store used when neither `--store` nor the configuration names one
///
/// `$KILN_STORE_DIR` wins, then the OS cache directory, then `~/.kiln/store`.
fn default_store_dir() -> Result<PathBuf, CliError> {
    store_dir_from(
        std::env::var_os(STORE_DIR_ENV).map(PathBuf::from),
        dirs::cache_dir(),
        dirs::home_dir(),
    )
}

fn store_dir_from(
    explicit: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
) -> Result<PathBuf, CliError> {
    explicit
        .filter(|dir| !dir.as_os_str().is_empty())
        .or_else(|| cache_dir.map(|dir| dir.join("kiln").join("store")))
        .or_else(|| home_dir.map(|dir| dir.join(".kiln").join("store")))
        .ok_or_else(|| {
            CliError::config_with_help(
                "No store directory could be determined",
                format!("Pass --store <DIR> or set {STORE_DIR_ENV}"),
            )
        })
}

/// Open storage and run `command` against it
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the command fails
pub fn execute(command: &Commands, config: &StoreConfig) -> Result<Output, CliError> {
    let storage = Arc::new(Storage::open(config)?);
    let output = run(command, &storage)?;
    if let Ok(storage) = Arc::try_unwrap(storage) {
        storage.close();
    }
    Ok(output)
}

/// Run `command` against already opened storage
///
/// # Errors
///
/// Returns an error if the command fails
pub fn run(command: &Commands, storage: &Shared) -> Result<Output, CliError> {
    tracing::debug!(command = ?command, "Running command");
    match command {
        Commands::Stats => stats(storage),
        Commands::Mappings => mappings(storage),
        Commands::Show { digest, shallow } => show(storage, digest, *shallow),
        Commands::Put { input } => put(storage, input),
        Commands::Link { from, to } => link(storage, from, to),
        Commands::Lookup { input } => lookup(storage, input),
    }
}

fn stats(storage: &Storage<AnyKeyValueStore>) -> Result<Output, CliError> {
    let path = match storage.content_store() {
        AnyKeyValueStore::Durable(store) => Some(store.environment().path().to_path_buf()),
        AnyKeyValueStore::Memory(_) => None,
    };
    let report = StatsReport {
        path,
        content_entries: storage.content_store().len()?,
        mappings: storage.mapping_store().len()?,
    };
    let mut text = format!(
        "content entries: {}\nmappings: {}",
        report.content_entries, report.mappings
    );
    if let Some(path) = &report.path {
        text = format!("store: {}\n{text}", path.display());
    }
    Output::new(&report, text)
}

fn mappings(storage: &Storage<AnyKeyValueStore>) -> Result<Output, CliError> {
    let mut entries: Vec<MappingEntry> = storage
        .mappings()?
        .into_iter()
        .map(|(from, to)| MappingEntry {
            from: from.to_hex(),
            to: to.to_hex(),
        })
        .collect();
    entries.sort_by(|a, b| a.from.cmp(&b.from));
    let text = entries
        .iter()
        .map(|e| format!("{} -> {}", e.from, e.to))
        .collect::<Vec<_>>()
        .join("\n");
    Output::new(&entries, text)
}

fn show(
    storage: &Storage<AnyKeyValueStore>,
    digest: &str,
    shallow: bool,
) -> Result<Output, CliError> {
    let digest = parse_digest(digest)?;
    let json = storage.get(&digest, !shallow)?.into_json();
    let text = serde_json::to_string_pretty(&json)
        .map_err(|e| CliError::store(format!("Failed to render value: {e}")))?;
    Output::new(&json, text)
}

fn put(storage: &Storage<AnyKeyValueStore>, input: &str) -> Result<Output, CliError> {
    let value = read_json_value(input)?;
    let digest = storage.put(&value, true)?;
    let hex = digest.to_hex();
    tracing::info!(digest = %digest, kind = value.kind_name(), "Stored value");
    Output::new(serde_json::json!({ "digest": hex }), hex.clone())
}

fn link(storage: &Storage<AnyKeyValueStore>, from: &str, to: &str) -> Result<Output, CliError> {
    let from = parse_digest(from)?;
    let to = parse_digest(to)?;
    // A mapping must point at content that exists
    storage.get(&to, false)?;
    storage.add_mapping(&from, &to)?;
    Output::new(
        &MappingEntry {
            from: from.to_hex(),
            to: to.to_hex(),
        },
        format!("{} -> {}", from.to_hex(), to.to_hex()),
    )
}

fn lookup(storage: &Shared, input: &str) -> Result<Output, CliError> {
    let runnable = read_json_value(input)?;
    let cache = Cache::new(Arc::clone(storage));
    let (request_key, result) = cache.get(&runnable)?;
    let report = LookupReport {
        request: request_key.to_hex(),
        result: result.map(Value::into_json),
    };
    let text = match &report.result {
        Some(json) => format!(
            "hit {}\n{}",
            report.request,
            serde_json::to_string_pretty(json)
                .map_err(|e| CliError::store(format!("Failed to render value: {e}")))?
        ),
        None => format!("miss {}", report.request),
    };
    Output::new(&report, text)
}

fn parse_digest(hex: &str) -> Result<Digest, CliError> {
    Digest::from_hex(hex.trim()).map_err(|e| {
        CliError::config_with_help(
            format!("'{hex}' is not a digest: {e}"),
            "Digests are 64 hex characters, as printed by `kiln put`",
        )
    })
}

fn read_json_value(input: &str) -> Result<Value, CliError> {
    let text = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| CliError::config(format!("Failed to read stdin: {e}")))?;
        buf
    } else {
        fs::read_to_string(input)
            .map_err(|e| CliError::config(format!("Failed to read {input}: {e}")))?
    };
    let json: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| CliError::config(format!("Invalid JSON in {input}: {e}")))?;
    Ok(Value::from_json(json)?)
}
