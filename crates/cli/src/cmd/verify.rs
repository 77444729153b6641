//! Verify command implementation
//!
//! Check a distribution against its integrity manifest without installing it.

use clap::Args;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use stowage_engine::{Manifest, VerificationReport};

use crate::command::Command;
use crate::common::{RuntimeContext, resolve_root};
use crate::error::{CommandError, Result};

/// Check a distribution against its integrity manifest
#[derive(Debug, Clone, Args)]
pub struct VerifyCommand {
    /// Distribution root
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,
}

impl Command for VerifyCommand {
    type Output = VerificationReport;

    fn execute(&self, context: &RuntimeContext) -> Result<VerificationReport> {
        let root = resolve_root(&self.dir)?;
        let general = &context.config.general;
        let manifest = Manifest::load(&root.as_path().join(&general.manifest_file))?;

        let report = manifest.verify_tree(
            &root,
            &general.manifest_file,
            &context.config.install.exclude_dirs,
        );

        for (path, expected, actual) in &report.mismatched {
            println!("  {} {path}", "mismatch".red());
            println!("    expected {}", expected.to_string().dimmed());
            println!("    actual   {}", actual.to_string().dimmed());
        }
        for path in &report.missing {
            println!("  {} {path}", "missing".red());
        }
        for path in &report.unlisted {
            println!("  {} {path}", "unlisted".yellow());
        }

        if report.is_valid() {
            println!(
                "{} All {} artifacts match the manifest",
                "✓".bright_green(),
                report.checked
            );
            Ok(report)
        } else {
            Err(CommandError::VerificationFailed {
                issues: report.mismatched.len() + report.missing.len() + report.unlisted.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use std::fs;
    use stowage_config::Config;
    use tempfile::TempDir;

    #[test]
    fn test_detects_tampering() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), b"a").unwrap();
        Manifest::build(temp.path(), "integrity-manifest.json", &[])
            .save(&temp.path().join("integrity-manifest.json"))
            .unwrap();

        let context = RuntimeContext::new(Config::default(), false);
        let command = VerifyCommand {
            dir: temp.path().to_path_buf(),
        };
        assert!(command.execute(&context).unwrap().is_valid());

        fs::write(temp.path().join("a.txt"), b"b").unwrap();
        let err = command.execute(&context).unwrap_err();
        assert!(matches!(err, CommandError::VerificationFailed { issues: 1 }));
    }
}
