//! Tracing configuration for the kiln CLI
//!
//! Events from the library crates are written to stderr so that command
//! output on stdout stays machine readable.

use std::io;
pub use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding a tracing filter directive
pub const LOG_ENV: &str = "KILN_LOG";

/// Tracing output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum TracingFormat {
    /// Pretty-printed human-readable format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
    /// Structured JSON format
    Json,
}

/// Log level options for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Show all logs (trace level)
    Trace,
    /// Show debug and above
    Debug,
    /// Show info and above
    Info,
    /// Show warnings and above (default)
    #[default]
    Warn,
    /// Show errors only
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

impl std::str::FromStr for TracingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown tracing format: {s}")),
        }
    }
}

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Output format
    pub format: TracingFormat,
    /// Level used when no filter is given and the environment sets none
    pub level: Level,
    /// Explicit filter directive, overriding the environment
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: TracingFormat::Pretty,
            level: Level::WARN, // Default to quiet operation
            filter: None,
        }
    }
}

/// Filter directive enabling `level` for every kiln crate
#[must_use]
pub fn default_directive(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    format!("kiln={level},kiln_cli={level},kiln_cas={level},kiln_cache={level}")
}

fn build_filter(config: &TracingConfig) -> miette::Result<EnvFilter> {
    if let Some(filter) = &config.filter {
        return EnvFilter::try_new(filter)
            .map_err(|e| miette::miette!("Failed to create tracing filter: {e}"));
    }
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new(default_directive(config.level)))
        .map_err(|e| miette::miette!("Failed to create tracing filter: {e}"))
}

/// Initialize tracing with the given configuration
///
/// # Errors
///
/// Returns an error if the filter directive is invalid
pub fn init_tracing(config: TracingConfig) -> miette::Result<()> {
    let registry = tracing_subscriber::registry().with(build_filter(&config)?);

    match config.format {
        TracingFormat::Pretty => {
            let layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(io::stderr)
                .with_target(true);

            registry.with(layer).init();
        }
        TracingFormat::Compact => {
            let layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(io::stderr)
                .with_target(false)
                .with_thread_ids(false);

            registry.with(layer).init();
        }
        TracingFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_current_span(true)
                .with_span_list(true);

            registry.with(layer).init();
        }
    }

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        format = ?config.format,
        "Tracing initialized for kiln CLI"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!(
            "pretty".parse::<TracingFormat>().unwrap(),
            TracingFormat::Pretty
        );
        assert_eq!("JSON".parse::<TracingFormat>().unwrap(), TracingFormat::Json);
        assert!("invalid".parse::<TracingFormat>().is_err());
    }

    #[test]
    fn test_level_conversion() {
        assert_eq!(Level::from(LogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(LogLevel::default()), Level::WARN);
    }

    #[test]
    fn test_default_directive() {
        assert_eq!(
            default_directive(Level::INFO),
            "kiln=info,kiln_cli=info,kiln_cas=info,kiln_cache=info"
        );
    }

    #[test]
    fn test_explicit_filter_wins() {
        let config = TracingConfig {
            filter: Some("kiln_cas=trace".to_string()),
            ..TracingConfig::default()
        };
        assert_eq!(build_filter(&config).unwrap().to_string(), "kiln_cas=trace");
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let config = TracingConfig {
            filter: Some("kiln=loudest".to_string()),
            ..TracingConfig::default()
        };
        assert!(build_filter(&config).is_err());
    }
}
