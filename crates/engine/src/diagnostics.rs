//! Installation health diagnostics and repair
//!
//! Diagnosis is read-only: it classifies an install root and lists what is
//! wrong. Repair re-runs full synchronization, and only when the caller has
//! explicitly confirmed it.

use crate::error::Result;
use crate::installer::{Installer, RunSummary, parse_component_record};
use crate::system::System;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use stowage_config::Config;
use stowage_core::path::{AbsPath, RelPath};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Aggregate health of an install root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthState {
    /// Nothing to repair
    Healthy,
    /// Install root absent
    Missing,
    /// Version marker absent, empty or unreadable
    Corrupted,
    /// Version marker valid but required or recorded components absent
    Partial,
}

impl HealthState {
    /// Whether no repair is needed
    #[must_use]
    pub fn is_healthy(self) -> bool {
        self == HealthState::Healthy
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthState::Healthy => "healthy",
            HealthState::Missing => "missing",
            HealthState::Corrupted => "corrupted",
            HealthState::Partial => "partial",
        };
        f.write_str(label)
    }
}

/// Kind of problem found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    /// Install root does not exist
    RootMissing,
    /// Install root exists but is not a directory
    RootNotDirectory,
    /// No version marker
    VersionMarkerMissing,
    /// Version marker holds only whitespace
    VersionMarkerEmpty,
    /// Version marker is a link, not UTF-8, or cannot be read
    VersionMarkerUnreadable,
    /// A required or recorded component is absent
    ComponentMissing,
}

/// One problem found in an install root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// What went wrong
    pub kind: IssueKind,
    /// Where
    pub path: PathBuf,
    /// Human-readable detail
    pub message: String,
}

impl Issue {
    fn new(kind: IssueKind, path: &Path, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

/// Result of diagnosing an install root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnosis {
    /// Aggregate state
    pub state: HealthState,
    /// Installed version, when the marker is readable
    pub version: Option<String>,
    /// Every problem found, in discovery order
    pub issues: Vec<Issue>,
    /// Pending updates (`.new` siblings) still awaiting the user's review
    pub pending_updates: Vec<PathBuf>,
}

impl Diagnosis {
    /// Remediation for this state
    #[must_use]
    pub fn strategy(&self) -> RepairStrategy {
        if self.state.is_healthy() {
            RepairStrategy::None
        } else {
            RepairStrategy::FullResync
        }
    }

    /// Get a summary of diagnosis results
    #[must_use]
    pub fn summary(&self) -> String {
        if self.state.is_healthy() {
            match &self.version {
                Some(version) => format!("✓ Installation is healthy (version {version})"),
                None => "✓ Installation is healthy".to_string(),
            }
        } else {
            let mut lines = vec![format!(
                "✗ Installation is {} ({} issue{})",
                self.state,
                self.issues.len(),
                if self.issues.len() == 1 { "" } else { "s" }
            )];
            lines.extend(self.issues.iter().map(|issue| format!("  - {issue}")));
            lines.join("\n")
        }
    }
}

/// How an unhealthy installation gets fixed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepairStrategy {
    /// Nothing to do
    None,
    /// Re-synchronize every distributed component
    FullResync,
}

impl fmt::Display for RepairStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairStrategy::None => f.write_str("none"),
            RepairStrategy::FullResync => f.write_str("full re-sync"),
        }
    }
}

/// Caller's answer to the confirmation gate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairOptions {
    /// Report what would be done without writing anything
    pub dry_run: bool,
    /// The user explicitly approved mutating the filesystem
    pub confirmed: bool,
}

/// Result of a repair request
#[derive(Debug)]
pub struct RepairReport {
    /// Issues found before repairing
    pub issues: Vec<Issue>,
    /// Remediation chosen for them
    pub strategy: RepairStrategy,
    /// Whether the filesystem was touched
    pub applied: bool,
    /// The re-sync run (planned when dry, real when applied)
    pub summary: Option<RunSummary>,
}

/// Diagnoses install roots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Doctor {
    version_file: String,
    components_file: String,
    pending_suffix: String,
    required_components: Vec<RelPath>,
}

impl Doctor {
    /// Build from configuration
    ///
    /// Required component paths that fail validation are ignored here;
    /// [`Config::validate`] rejects them when configuration is loaded.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            version_file: config.general.version_file.clone(),
            components_file: config.general.components_file.clone(),
            pending_suffix: config.general.pending_suffix.clone(),
            required_components: config
                .install
                .required_components
                .iter()
                .filter_map(|key| RelPath::from_manifest_key(key).ok())
                .collect(),
        }
    }

    /// Classify the install root at `root`
    ///
    /// Never fails: every problem is an [`Issue`].
    #[must_use]
    pub fn diagnose(&self, root: &AbsPath) -> Diagnosis {
        let mut diagnosis = Diagnosis {
            state: HealthState::Healthy,
            version: None,
            issues: Vec::new(),
            pending_updates: Vec::new(),
        };

        match fs::symlink_metadata(root.as_path()) {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => {
                diagnosis.state = HealthState::Missing;
                diagnosis.issues.push(Issue::new(
                    IssueKind::RootNotDirectory,
                    root.as_path(),
                    "install root is not a directory",
                ));
                return diagnosis;
            }
            Err(_) => {
                diagnosis.state = HealthState::Missing;
                diagnosis.issues.push(Issue::new(
                    IssueKind::RootMissing,
                    root.as_path(),
                    "install root does not exist",
                ));
                return diagnosis;
            }
        }

        let marker = root.as_path().join(&self.version_file);
        match read_version_marker(&marker) {
            Ok(version) => diagnosis.version = Some(version),
            Err(issue) => {
                diagnosis.state = HealthState::Corrupted;
                diagnosis.issues.push(issue);
            }
        }

        for component in self.expected_components(root.as_path()) {
            let path = root.join(&component);
            if fs::symlink_metadata(path.as_path()).is_err() {
                diagnosis.issues.push(Issue::new(
                    IssueKind::ComponentMissing,
                    path.as_path(),
                    format!("required component '{component}' is missing"),
                ));
            }
        }
        if diagnosis.state.is_healthy() && !diagnosis.issues.is_empty() {
            diagnosis.state = HealthState::Partial;
        }

        diagnosis.pending_updates = self.find_pending_updates(root.as_path());
        debug!(
            root = %root,
            state = %diagnosis.state,
            issues = diagnosis.issues.len(),
            "Diagnosed installation"
        );
        diagnosis
    }

    /// Configured required components, then those the last install recorded
    ///
    /// A missing or unreadable record adds nothing.
    fn expected_components(&self, root: &Path) -> Vec<RelPath> {
        let mut expected = self.required_components.clone();

        let record = root.join(&self.components_file);
        let is_file = fs::symlink_metadata(&record).is_ok_and(|m| m.file_type().is_file());
        if let Some(text) = is_file.then(|| fs::read_to_string(&record).ok()).flatten() {
            for name in parse_component_record(&text) {
                match RelPath::from_manifest_key(&name) {
                    Ok(component) if !expected.contains(&component) => expected.push(component),
                    Ok(_) => {}
                    Err(err) => debug!(component = %name, error = %err, "Ignoring recorded component"),
                }
            }
        }

        expected
    }

    /// Diagnose the installer's destination and re-synchronize it if needed
    ///
    /// Writes happen only when `options.confirmed` is set and `options.dry_run`
    /// is not. A dry run plans the re-sync without writing.
    ///
    /// # Errors
    ///
    /// Errors from a re-sync that could not start (see [`Installer::run`]).
    pub fn repair<S: System>(
        &self,
        installer: &Installer<S>,
        options: RepairOptions,
    ) -> Result<RepairReport> {
        let diagnosis = self.diagnose(installer.dest_root());
        let strategy = diagnosis.strategy();
        let mut report = RepairReport {
            issues: diagnosis.issues,
            strategy,
            applied: false,
            summary: None,
        };

        if strategy == RepairStrategy::None {
            info!(root = %installer.dest_root(), "Nothing to repair");
            return Ok(report);
        }

        if options.dry_run {
            let planner = installer.plan();
            let mut summary = planner.run(&[])?;
            summary.dry_run = true;
            summary.planned = planner.system().operations();
            report.summary = Some(summary);
        } else if options.confirmed {
            info!(root = %installer.dest_root(), %strategy, "Repairing installation");
            report.summary = Some(installer.run(&[])?);
            report.applied = true;
        } else {
            warn!(root = %installer.dest_root(), "Repair not confirmed, nothing changed");
        }

        Ok(report)
    }

    fn find_pending_updates(&self, root: &Path) -> Vec<PathBuf> {
        WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy();
                name.strip_suffix(self.pending_suffix.as_str())
                    .is_some_and(|base| {
                        !base.is_empty() && entry.path().with_file_name(base).is_file()
                    })
            })
            .map(walkdir::DirEntry::into_path)
            .collect()
    }
}

fn read_version_marker(marker: &Path) -> std::result::Result<String, Issue> {
    match fs::symlink_metadata(marker) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            return Err(Issue::new(
                IssueKind::VersionMarkerUnreadable,
                marker,
                "version marker is a symbolic link",
            ));
        }
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Issue::new(
                IssueKind::VersionMarkerMissing,
                marker,
                "version marker is missing",
            ));
        }
        Err(e) => {
            return Err(Issue::new(
                IssueKind::VersionMarkerUnreadable,
                marker,
                format!("version marker is unreadable: {e}"),
            ));
        }
    }

    let content = fs::read(marker).map_err(|e| {
        Issue::new(
            IssueKind::VersionMarkerUnreadable,
            marker,
            format!("version marker is unreadable: {e}"),
        )
    })?;
    let text = String::from_utf8(content).map_err(|_| {
        Issue::new(
            IssueKind::VersionMarkerUnreadable,
            marker,
            "version marker is not valid UTF-8",
        )
    })?;

    let version = text.lines().next().unwrap_or_default().trim();
    if version.is_empty() {
        Err(Issue::new(
            IssueKind::VersionMarkerEmpty,
            marker,
            "version marker is empty",
        ))
    } else {
        Ok(version.to_string())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use crate::system::RealSystem;
    use tempfile::TempDir;

    fn doctor(required: &[&str]) -> Doctor {
        let mut config = Config::default();
        config.install.required_components = required.iter().map(|s| (*s).to_string()).collect();
        Doctor::from_config(&config)
    }

    fn root(temp: &TempDir) -> AbsPath {
        AbsPath::from_path(&temp.path().join("install")).unwrap()
    }

    #[test]
    fn test_missing_root() {
        let temp = TempDir::new().unwrap();
        let diagnosis = doctor(&[]).diagnose(&root(&temp));
        assert_eq!(diagnosis.state, HealthState::Missing);
        assert_eq!(diagnosis.issues[0].kind, IssueKind::RootMissing);
        assert_eq!(diagnosis.strategy(), RepairStrategy::FullResync);
    }

    #[test]
    fn test_marker_states() {
        let temp = TempDir::new().unwrap();
        let root = root(&temp);
        fs::create_dir_all(root.as_path()).unwrap();
        let marker = root.as_path().join("VERSION");

        let diagnosis = doctor(&[]).diagnose(&root);
        assert_eq!(diagnosis.state, HealthState::Corrupted);
        assert_eq!(diagnosis.issues[0].kind, IssueKind::VersionMarkerMissing);

        fs::write(&marker, b"   \n").unwrap();
        let diagnosis = doctor(&[]).diagnose(&root);
        assert_eq!(diagnosis.state, HealthState::Corrupted);
        assert_eq!(diagnosis.issues[0].kind, IssueKind::VersionMarkerEmpty);

        fs::write(&marker, [0xff, 0xfe]).unwrap();
        let diagnosis = doctor(&[]).diagnose(&root);
        assert_eq!(diagnosis.issues[0].kind, IssueKind::VersionMarkerUnreadable);

        fs::write(&marker, b"1.4.0\n").unwrap();
        let diagnosis = doctor(&[]).diagnose(&root);
        assert_eq!(diagnosis.state, HealthState::Healthy);
        assert_eq!(diagnosis.version.as_deref(), Some("1.4.0"));
        assert!(diagnosis.summary().contains("1.4.0"));
    }

    #[test]
    fn test_partial_when_component_missing() {
        let temp = TempDir::new().unwrap();
        let root = root(&temp);
        fs::create_dir_all(root.as_path().join("hooks")).unwrap();
        fs::write(root.as_path().join("VERSION"), b"1.0\n").unwrap();

        let diagnosis = doctor(&["hooks", "commands"]).diagnose(&root);
        assert_eq!(diagnosis.state, HealthState::Partial);
        assert_eq!(diagnosis.issues.len(), 1);
        assert_eq!(diagnosis.issues[0].kind, IssueKind::ComponentMissing);
        assert!(diagnosis.summary().starts_with("✗ Installation is partial (1 issue)"));
    }

    #[test]
    fn test_recorded_components_are_checked() {
        let temp = TempDir::new().unwrap();
        let root = root(&temp);
        fs::create_dir_all(root.as_path().join("hooks")).unwrap();
        fs::write(root.as_path().join("VERSION"), b"1.0\n").unwrap();
        fs::write(
            root.as_path().join(".installed-components"),
            b"commands\nhooks\n../escape\n",
        )
        .unwrap();

        let diagnosis = doctor(&["commands"]).diagnose(&root);
        assert_eq!(diagnosis.state, HealthState::Partial);
        assert_eq!(diagnosis.issues.len(), 1);
        assert_eq!(diagnosis.issues[0].path, root.as_path().join("commands"));
    }

    #[test]
    fn test_corrupted_takes_precedence_over_partial() {
        let temp = TempDir::new().unwrap();
        let root = root(&temp);
        fs::create_dir_all(root.as_path()).unwrap();

        let diagnosis = doctor(&["hooks"]).diagnose(&root);
        assert_eq!(diagnosis.state, HealthState::Corrupted);
        assert_eq!(diagnosis.issues.len(), 2);
    }

    #[test]
    fn test_pending_updates_are_listed() {
        let temp = TempDir::new().unwrap();
        let root = root(&temp);
        fs::create_dir_all(root.as_path().join("hooks")).unwrap();
        fs::write(root.as_path().join("VERSION"), b"1.0\n").unwrap();
        fs::write(root.as_path().join("hooks/guard.sh"), b"edited").unwrap();
        fs::write(root.as_path().join("hooks/guard.sh.new"), b"shipped").unwrap();
        fs::write(root.as_path().join("hooks/orphan.new"), b"no sibling").unwrap();

        let diagnosis = doctor(&[]).diagnose(&root);
        assert!(diagnosis.state.is_healthy());
        assert_eq!(
            diagnosis.pending_updates,
            vec![root.as_path().join("hooks/guard.sh.new")]
        );
    }

    fn distribution(temp: &TempDir) -> AbsPath {
        let src = temp.path().join("dist");
        fs::create_dir_all(src.join("hooks")).unwrap();
        fs::write(src.join("hooks/guard.sh"), b"#!/bin/sh\n").unwrap();
        fs::write(src.join("VERSION"), b"3.0.0\n").unwrap();
        AbsPath::from_path(&src).unwrap()
    }

    #[test]
    fn test_repair_requires_confirmation() {
        let temp = TempDir::new().unwrap();
        let installer =
            Installer::new(distribution(&temp), root(&temp), Config::default(), RealSystem);
        let doctor = doctor(&["hooks"]);

        let report = doctor.repair(&installer, RepairOptions::default()).unwrap();
        assert_eq!(report.strategy, RepairStrategy::FullResync);
        assert!(!report.applied);
        assert!(report.summary.is_none());
        assert!(!root(&temp).as_path().exists());

        let report = doctor
            .repair(
                &installer,
                RepairOptions {
                    dry_run: true,
                    confirmed: true,
                },
            )
            .unwrap();
        assert!(!report.applied);
        assert!(report.summary.unwrap().dry_run);
        assert!(!root(&temp).as_path().exists());
    }

    #[test]
    fn test_confirmed_repair_restores_health() {
        let temp = TempDir::new().unwrap();
        let installer =
            Installer::new(distribution(&temp), root(&temp), Config::default(), RealSystem);
        let doctor = doctor(&["hooks"]);

        let report = doctor
            .repair(
                &installer,
                RepairOptions {
                    dry_run: false,
                    confirmed: true,
                },
            )
            .unwrap();
        assert!(report.applied);
        assert!(report.summary.unwrap().is_success());

        let diagnosis = doctor.diagnose(&root(&temp));
        assert_eq!(diagnosis.state, HealthState::Healthy);
        assert_eq!(diagnosis.version.as_deref(), Some("3.0.0"));

        let report = doctor
            .repair(
                &installer,
                RepairOptions {
                    dry_run: false,
                    confirmed: true,
                },
            )
            .unwrap();
        assert_eq!(report.strategy, RepairStrategy::None);
        assert!(!report.applied);
    }
}
