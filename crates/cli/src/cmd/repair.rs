//! Repair command implementation
//!
//! Re-synchronize an unhealthy install root after explicit confirmation.

use clap::Args;
use owo_colors::OwoColorize;
use std::io::IsTerminal;
use std::path::PathBuf;
use stowage_engine::{
    Doctor, Installer, RealSystem, RepairOptions, RepairReport, RepairStrategy,
};

use crate::cmd::diagnose::print_diagnosis;
use crate::cmd::sync::print_entries;
use crate::command::Command;
use crate::common::{RuntimeContext, resolve_root};
use crate::error::{CommandError, Result};
use crate::stats::SyncStats;

/// Re-synchronize an unhealthy install root
#[derive(Debug, Clone, Args)]
pub struct RepairCommand {
    /// Distribution root
    #[arg(long, env = "STOWAGE_SOURCE", value_name = "DIR")]
    pub source: PathBuf,

    /// Install root
    #[arg(long, env = "STOWAGE_DEST", value_name = "DIR")]
    pub dest: PathBuf,

    /// Dry run - show the planned re-sync without writing
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

impl Command for RepairCommand {
    type Output = RepairReport;

    fn execute(&self, context: &RuntimeContext) -> Result<RepairReport> {
        let installer = Installer::new(
            resolve_root(&self.source)?,
            resolve_root(&self.dest)?,
            (*context.config).clone(),
            RealSystem,
        );
        let doctor = Doctor::from_config(&context.config);

        let diagnosis = doctor.diagnose(installer.dest_root());
        print_diagnosis(&diagnosis);

        let confirmed = if diagnosis.strategy() == RepairStrategy::None || self.dry_run {
            false
        } else if self.yes {
            true
        } else if std::io::stdin().is_terminal() {
            use dialoguer::{Confirm, theme::ColorfulTheme};

            Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt("Re-synchronize the installation?")
                .default(false)
                .interact()?
        } else {
            println!(
                "{}",
                "Not a terminal: pass --yes to repair non-interactively".yellow()
            );
            false
        };

        let report = doctor.repair(
            &installer,
            RepairOptions {
                dry_run: self.dry_run,
                confirmed,
            },
        )?;

        if let Some(summary) = &report.summary {
            println!();
            print_entries(summary, context.verbose);
            let stats = SyncStats::from_summary(summary);
            println!();
            stats.print_summary(summary.dry_run);

            if stats.failed > 0 {
                return Err(CommandError::SyncFailed {
                    failed: stats.failed,
                    total: stats.total(),
                });
            }
        }

        if report.applied {
            println!("{} Repair applied", "✓".bright_green());
        } else if report.strategy == RepairStrategy::FullResync && !self.dry_run {
            println!("Repair not applied.");
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use std::fs;
    use stowage_config::Config;
    use tempfile::TempDir;

    fn command(temp: &TempDir, dry_run: bool, yes: bool) -> RepairCommand {
        RepairCommand {
            source: temp.path().join("dist"),
            dest: temp.path().join("install"),
            dry_run,
            yes,
        }
    }

    #[test]
    fn test_dry_run_never_writes() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("dist/hooks")).unwrap();
        fs::write(temp.path().join("dist/hooks/guard.sh"), b"x").unwrap();

        let context = RuntimeContext::new(Config::default(), false);
        let report = command(&temp, true, true).execute(&context).unwrap();
        assert_eq!(report.strategy, RepairStrategy::FullResync);
        assert!(!report.applied);
        assert!(!temp.path().join("install").exists());
    }

    #[test]
    fn test_yes_applies_repair() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("dist/hooks")).unwrap();
        fs::write(temp.path().join("dist/hooks/guard.sh"), b"x").unwrap();
        fs::write(temp.path().join("dist/VERSION"), b"0.9\n").unwrap();

        let context = RuntimeContext::new(Config::default(), false);
        let report = command(&temp, false, true).execute(&context).unwrap();
        assert!(report.applied);
        assert_eq!(
            fs::read_to_string(temp.path().join("install/VERSION")).unwrap(),
            "0.9\n"
        );
    }
}
