//! kiln command-line interface
//!
//! Small inspection and editing tool for kiln stores: entry counts, mapping
//! listings, printing stored values as JSON and storing new ones.

pub mod cli;
pub mod commands;
pub mod tracing;

pub use cli::{Cli, CliError, Commands};
pub use commands::{Output, execute, resolve_config};
