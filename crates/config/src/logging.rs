//! Logging configuration for the stowage CLI
//!
//! Terminal output and optional file logging using tracing.

use crate::Result;
use std::path::Path;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Crates whose events are shown by default
const LOG_TARGETS: &[&str] = &["stowage", "stowage_engine", "stowage_config"];

/// Build the default filter directive for a level, e.g. `stowage=info,stowage_engine=info`
fn default_directive(level: &str) -> String {
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize the logging system
///
/// # Arguments
/// * `verbose` - Enable debug level logging and timestamps
/// * `log_file` - Optional path to append a detailed, uncoloured log to
///
/// `RUST_LOG` overrides the terminal filter when set.
///
/// # Examples
/// ```ignore
/// // Basic usage with info level
/// init(false, None)?;
///
/// // Verbose mode with a debug log file
/// init(true, Some(Path::new("stowage.log")))?;
/// ```
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(level)))
        .map_err(|e| stowage_core::Error::Message(format!("Invalid log filter: {e}")))?;

    let terminal = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_ansi(true);

    // No timestamps in normal mode
    let terminal: Box<dyn Layer<Registry> + Send + Sync> = if verbose {
        terminal.with_filter(env_filter).boxed()
    } else {
        terminal.without_time().with_filter(env_filter).boxed()
    };

    let file_layer = match log_file {
        Some(log_path) => {
            if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)?;

            let file_filter = EnvFilter::try_new(default_directive("debug"))
                .map_err(|e| stowage_core::Error::Message(format!("Invalid log filter: {e}")))?;

            Some(
                fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .pretty()
                    .with_filter(file_filter),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(terminal)
        .with(file_layer)
        .try_init()
        .map_err(|e| stowage_core::Error::Message(format!("Failed to initialize logging: {e}")))?;

    Ok(())
}
