//! Manifest command implementation
//!
//! Generate the integrity manifest for a distribution at package-build time.

use clap::Args;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use stowage_engine::Manifest;
use tracing::info;

use crate::command::Command;
use crate::common::{RuntimeContext, resolve_root};
use crate::error::Result;

/// Generate the integrity manifest of a distribution
#[derive(Debug, Clone, Args)]
pub struct ManifestCommand {
    /// Distribution root to hash
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Where to write the manifest (defaults to the configured name under DIR)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

impl Command for ManifestCommand {
    type Output = Manifest;

    fn execute(&self, context: &RuntimeContext) -> Result<Manifest> {
        let root = resolve_root(&self.dir)?;
        let general = &context.config.general;

        let manifest = Manifest::build(
            root.as_path(),
            &general.manifest_file,
            &context.config.install.exclude_dirs,
        );
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| root.as_path().join(&general.manifest_file));
        manifest.save(&output)?;

        info!(path = %output.display(), entries = manifest.len(), "Wrote integrity manifest");
        println!(
            "{} {} artifacts → {}",
            "●".bright_green(),
            manifest.len().to_string().bold(),
            output.display().cyan()
        );
        Ok(manifest)
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
    fn test_writes_manifest_beside_distribution() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("hooks")).unwrap();
        fs::write(temp.path().join("hooks/guard.sh"), b"x").unwrap();

        let command = ManifestCommand {
            dir: temp.path().to_path_buf(),
            output: None,
        };
        let manifest = command
            .execute(&RuntimeContext::new(Config::default(), false))
            .unwrap();

        assert_eq!(manifest.len(), 1);
        let written = Manifest::load(&temp.path().join("integrity-manifest.json")).unwrap();
        assert_eq!(written, manifest);
    }
}
