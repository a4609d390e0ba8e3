//! kiln CLI Application
//!
//! Inspects and edits kiln content-addressed stores from the command line.

// CLI binary needs to output to stdout/stderr - this is intentional
#![allow(clippy::print_stdout, clippy::print_stderr)]

use kiln_cli::cli::{self, CliError, EXIT_CLI, EXIT_OK, OkEnvelope, exit_code_for, render_error};
use kiln_cli::commands;
use kiln_cli::tracing::{self, TracingConfig};

fn main() {
    // NOTE: Using eprintln! in panic hook is intentional - tracing infrastructure
    // may be corrupted during a panic, so we use the most reliable output method.
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with KILN_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    let tracing_config = TracingConfig {
        format: cli.log_format,
        level: cli.level.into(),
        ..Default::default()
    };
    if let Err(e) = tracing::init_tracing(tracing_config) {
        render_error(
            &CliError::config_with_help(
                format!("{e}"),
                format!("Check the {} environment variable", tracing::LOG_ENV),
            ),
            cli.json,
        );
        std::process::exit(EXIT_CLI);
    }

    std::process::exit(run(&cli));
}

fn run(cli: &cli::Cli) -> i32 {
    let result = commands::resolve_config(cli.config.as_deref(), cli.store.as_deref())
        .and_then(|config| commands::execute(&cli.command, &config));

    match result {
        Ok(output) => {
            if cli.json {
                match serde_json::to_string(&OkEnvelope::new(output.data)) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        let err = CliError::store(format!("Failed to serialize output: {e}"));
                        render_error(&err, true);
                        return exit_code_for(&err);
                    }
                }
            } else if !output.text.is_empty() {
                println!("{}", output.text);
            }
            EXIT_OK
        }
        Err(err) => {
            ::tracing::debug!(error = %err, "Command failed");
            render_error(&err, cli.json);
            exit_code_for(&err)
        }
    }
}
