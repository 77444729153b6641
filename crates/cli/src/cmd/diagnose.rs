//! Diagnose command implementation
//!
//! Report the health of an install root. Read-only.

use clap::Args;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use stowage_engine::{Diagnosis, Doctor};

use crate::command::Command;
use crate::common::{RuntimeContext, resolve_root};
use crate::error::{CommandError, Result};

/// Report the health of an install root
#[derive(Debug, Clone, Args)]
pub struct DiagnoseCommand {
    /// Install root
    #[arg(long, env = "STOWAGE_DEST", value_name = "DIR")]
    pub dest: PathBuf,
}

impl Command for DiagnoseCommand {
    type Output = Diagnosis;

    fn execute(&self, context: &RuntimeContext) -> Result<Diagnosis> {
        let root = resolve_root(&self.dest)?;
        let diagnosis = Doctor::from_config(&context.config).diagnose(&root);

        print_diagnosis(&diagnosis);

        if diagnosis.state.is_healthy() {
            Ok(diagnosis)
        } else {
            Err(CommandError::Unhealthy {
                state: diagnosis.state,
            })
        }
    }
}

pub(crate) fn print_diagnosis(diagnosis: &Diagnosis) {
    println!("{}", diagnosis.summary());

    if !diagnosis.pending_updates.is_empty() {
        println!(
            "{} {} pending update(s) awaiting review:",
            "●".yellow(),
            diagnosis.pending_updates.len()
        );
        for path in &diagnosis.pending_updates {
            println!("  {}", path.display().dimmed());
        }
    }

    if !diagnosis.state.is_healthy() {
        println!(
            "Proposed repair: {} (run `stowage repair`)",
            diagnosis.strategy().to_string().cyan()
        );
    }
}
