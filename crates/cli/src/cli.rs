use crate::tracing::{LogLevel, TracingFormat};
use clap::{Parser, Subcommand};
use miette::{Diagnostic, Report};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// CLI, configuration or input error exit code
pub const EXIT_CLI: i32 = 2;
/// Store failure exit code
pub const EXIT_STORE: i32 = 3;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// CLI, configuration or input error (exit code 2)
    #[error("CLI/configuration error: {message}")]
    #[diagnostic(code(kiln::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Failure reading or writing the store (exit code 3)
    #[error("Store error: {message}")]
    #[diagnostic(code(kiln::cli::store))]
    Store {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new store error
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new store error with help text
    #[must_use]
    pub fn store_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

/// Convert `kiln_cas::Error` to the matching `CliError` variant.
///
/// Bad digests, unknown keys and configuration problems come from user input
/// (exit code 2); everything else is a store failure (exit code 3).
impl From<kiln_cas::Error> for CliError {
    fn from(err: kiln_cas::Error) -> Self {
        let help = miette::Diagnostic::help(&err).map(|h| h.to_string());
        match err {
            kiln_cas::Error::Configuration { message } => Self::Config { message, help },
            kiln_cas::Error::InvalidDigest { .. }
            | kiln_cas::Error::InvalidHex { .. }
            | kiln_cas::Error::InvalidKey { .. }
            | kiln_cas::Error::Serialization { .. } => Self::Config {
                message: err.to_string(),
                help,
            },
            other => Self::Store {
                message: match std::error::Error::source(&other) {
                    Some(source) => format!("{other}: {source}"),
                    None => other.to_string(),
                },
                help,
            },
        }
    }
}

impl From<kiln_cache::Error> for CliError {
    fn from(err: kiln_cache::Error) -> Self {
        match err {
            kiln_cache::Error::Storage(e) => e.into(),
            action @ kiln_cache::Error::Action { .. } => Self::store(action.to_string()),
        }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CLI,
        CliError::Store { .. } => EXIT_STORE,
    }
}

/// Render error appropriately based on JSON flag
#[allow(clippy::print_stdout, clippy::print_stderr)]
pub fn render_error(err: &CliError, json_mode: bool) {
    if json_mode {
        let error_envelope = ErrorEnvelope::new(serde_json::json!({
            "code": match err {
                CliError::Config { .. } => "config",
                CliError::Store { .. } => "store",
            },
            "message": err.to_string()
        }));

        match serde_json::to_string(&error_envelope) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        // Use miette for human-friendly error display
        let report = Report::new(err.clone());
        eprintln!("{report:?}");
        // Ensure output is flushed before potential process exit
        let _ = io::stderr().flush();
    }
}

/// Success response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkEnvelope<T> {
    /// Status indicator - always "ok" for success
    pub status: &'static str,
    /// The actual data payload
    pub data: T,
}

impl<T> OkEnvelope<T> {
    /// Create a new success envelope
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { status: "ok", data }
    }
}

/// Error response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope<E> {
    /// Status indicator - always "error" for failures
    pub status: &'static str,
    /// The error details
    pub error: E,
}

impl<E> ErrorEnvelope<E> {
    /// Create a new error envelope
    #[must_use]
    pub const fn new(error: E) -> Self {
        Self {
            status: "error",
            error,
        }
    }
}

/// Inspect and edit kiln content stores.
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(about = "Inspect and edit kiln content-addressed stores")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Store configuration file (TOML).
    #[arg(long, global = true, value_name = "FILE", env = "KILN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Store directory, overriding the configuration file.
    ///
    /// Defaults to `$KILN_STORE_DIR`, then the per-user cache directory.
    #[arg(long, global = true, value_name = "DIR")]
    pub store: Option<PathBuf>,

    /// Logging verbosity level.
    #[arg(
        short = 'L',
        long = "log-level",
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    /// Log output format.
    #[arg(
        long = "log-format",
        global = true,
        help = "Set log output format",
        default_value = "pretty",
        value_enum
    )]
    pub log_format: TracingFormat,

    /// Emit JSON envelope instead of plain text.
    #[arg(long, global = true, help = "Emit JSON envelope instead of plain text")]
    pub json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Show entry counts of the store.
    #[command(about = "Show entry counts of the content and mapping namespaces")]
    Stats,
    /// List every recorded mapping.
    #[command(about = "List request to result mappings")]
    Mappings,
    /// Print a stored value as JSON.
    #[command(about = "Print the value stored under a digest as JSON")]
    Show {
        /// Hex digest of the value.
        #[arg(value_name = "DIGEST")]
        digest: String,
        /// Print child references instead of resolving them.
        #[arg(long, help = "Print child references instead of resolving them")]
        shallow: bool,
    },
    /// Store a JSON document.
    #[command(about = "Store a JSON document and print its digest")]
    Put {
        /// JSON file to read, or `-` for stdin.
        #[arg(value_name = "FILE", default_value = "-")]
        input: String,
    },
    /// Point one digest at another.
    #[command(about = "Record a mapping from one digest to another")]
    Link {
        /// Hex digest of the request.
        #[arg(value_name = "FROM")]
        from: String,
        /// Hex digest of stored content.
        #[arg(value_name = "TO")]
        to: String,
    },
    /// Look up the cached result for a JSON request.
    #[command(about = "Look up the cached result for a JSON request")]
    Lookup {
        /// JSON file to read, or `-` for stdin.
        #[arg(value_name = "FILE", default_value = "-")]
        input: String,
    },
}

/// Parse command line arguments
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}
