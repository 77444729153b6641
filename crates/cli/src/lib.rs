//! Stowage CLI library
//!
//! This library contains all the CLI logic for stowage, making it reusable
//! for testing and integration with other tools.

pub mod cmd;
pub mod command;
pub mod common;
pub mod error;
pub mod stats;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stowage_config::Config;

use cmd::diagnose::DiagnoseCommand;
use cmd::manifest::ManifestCommand;
use cmd::repair::RepairCommand;
use cmd::sync::SyncCommand;
use cmd::verify::VerifyCommand;
use command::Command;
use common::RuntimeContext;

/// Stowage - install a configuration distribution without losing local edits
#[derive(Parser)]
#[command(name = "stowage")]
#[command(about = "Install a configuration distribution without losing local edits")]
#[command(version)]
#[command(long_about = "Install a configuration distribution without losing local edits

Every artifact is verified against the distribution's integrity manifest and
classified against the installed copy and its pristine backup. Files you have
edited are never overwritten; the new version lands beside them as a pending
update instead.")]
pub struct Cli {
    /// Path to the config file
    #[arg(long, env = "STOWAGE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose output (shows DEBUG level logs and unchanged artifacts)
    #[arg(short, long)]
    pub verbose: bool,

    /// Write logs to a file (useful for debugging)
    #[arg(long, env = "STOWAGE_LOG_FILE", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for stowage CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Install or update a distribution into an install root
    Sync(SyncCommand),

    /// Generate the integrity manifest of a distribution
    Manifest(ManifestCommand),

    /// Check a distribution against its integrity manifest
    Verify(VerifyCommand),

    /// Report the health of an install root
    Diagnose(DiagnoseCommand),

    /// Re-synchronize an unhealthy install root
    Repair(RepairCommand),
}

/// Main entry point for the CLI logic
///
/// # Errors
///
/// Returns an error if:
/// - Logging initialization fails
/// - Configuration loading fails
/// - Command execution fails
pub fn run(cli: Cli) -> Result<()> {
    stowage_config::logging::init(cli.verbose, cli.log_file.as_deref())?;

    let config = Config::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    let context = RuntimeContext::new(config, cli.verbose);

    execute_command(cli.command, &context)
}

fn execute_command(command: Commands, context: &RuntimeContext) -> Result<()> {
    match command {
        Commands::Sync(sync_cmd) => {
            sync_cmd.execute(context)?;
        }
        Commands::Manifest(manifest_cmd) => {
            manifest_cmd.execute(context)?;
        }
        Commands::Verify(verify_cmd) => {
            verify_cmd.execute(context)?;
        }
        Commands::Diagnose(diagnose_cmd) => {
            diagnose_cmd.execute(context)?;
        }
        Commands::Repair(repair_cmd) => {
            repair_cmd.execute(context)?;
        }
    }
    Ok(())
}
