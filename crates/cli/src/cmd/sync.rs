//! Sync command implementation
//!
//! Synchronize a distribution onto an install root.

use clap::Args;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use stowage_engine::{RunSummary, SyncOutcome, SyncRequest, synchronize};
use tracing::debug;

use crate::command::Command;
use crate::common::{RuntimeContext, resolve_root};
use crate::error::{CommandError, Result};
use crate::stats::SyncStats;

/// Synchronize a distribution onto an install root
#[derive(Debug, Clone, Args)]
pub struct SyncCommand {
    /// Distribution root (holds the components and the integrity manifest)
    #[arg(long, env = "STOWAGE_SOURCE", value_name = "DIR")]
    pub source: PathBuf,

    /// Install root
    #[arg(long, env = "STOWAGE_DEST", value_name = "DIR")]
    pub dest: PathBuf,

    /// Dry run - classify and report, never write
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Components to synchronize (all if not specified)
    #[arg(value_name = "COMPONENT")]
    pub components: Vec<String>,
}

impl Command for SyncCommand {
    type Output = RunSummary;

    fn execute(&self, context: &RuntimeContext) -> Result<RunSummary> {
        let request = SyncRequest {
            source_root: resolve_root(&self.source)?.into_path_buf(),
            dest_root: resolve_root(&self.dest)?.into_path_buf(),
            components: self.components.clone(),
            dry_run: self.dry_run,
        };
        debug!(?request, "Starting sync");

        let summary = synchronize(&request, &context.config)?;
        print_entries(&summary, context.verbose);

        let stats = SyncStats::from_summary(&summary);
        println!();
        stats.print_summary(summary.dry_run);

        if stats.failed > 0 {
            return Err(CommandError::SyncFailed {
                failed: stats.failed,
                total: stats.total(),
            });
        }
        Ok(summary)
    }
}

fn pad(label: &str) -> String {
    format!("{label:>11}")
}

/// Print one line per artifact worth mentioning
pub(crate) fn print_entries(summary: &RunSummary, verbose: bool) {
    for entry in &summary.entries {
        match &entry.result {
            Ok(report) => {
                let label = match report.outcome {
                    SyncOutcome::Installed => pad("installed").green().to_string(),
                    SyncOutcome::Updated => pad("updated").green().to_string(),
                    SyncOutcome::Unchanged if verbose => pad("unchanged").dimmed().to_string(),
                    SyncOutcome::Unchanged => continue,
                    SyncOutcome::Skipped => pad("skipped").yellow().to_string(),
                    SyncOutcome::Blocked => pad("blocked").yellow().to_string(),
                };
                print!("  {label} {}", entry.artifact);
                if let Some(pending) = &report.pending {
                    print!(" {}", format!("→ {pending}").dimmed());
                }
                if report.parse_fallback {
                    print!(" {}", "(not valid JSON, copied verbatim)".dimmed());
                }
                println!();
            }
            Err(err) if err.kind().is_non_fatal() => {
                println!("  {} {}: {err}", pad("rejected").yellow(), entry.artifact);
            }
            Err(err) => {
                println!("  {} {}: {err}", pad("failed").red(), entry.artifact);
            }
        }
    }

    for name in &summary.missing_components {
        println!("  {} {name}", pad("not shipped").dimmed());
    }

    if !summary.manifest_checked {
        println!(
            "{}",
            "No integrity manifest found, artifacts were not verified".yellow()
        );
    }
    if let Some(version) = &summary.version_written {
        println!("Recorded version {}", version.cyan());
    }
}
