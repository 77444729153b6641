//! Installation runs
//!
//! An [`Installer`] synchronizes the components of a distribution root onto an
//! install root, gated by the distribution's integrity manifest, and stamps
//! the install root with the distributed version when everything succeeded.

use crate::error::{Error, Result};
use crate::integrity::{Manifest, is_excluded_dir};
use crate::structured::{StructuredSettings, StructuredSync};
use crate::sync::{FileSync, SyncOutcome, SyncReport, SyncSettings};
use crate::system::{DryRunSystem, Operation, RealSystem, System};
use crate::tree::{EntryResult, TreeSync};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use stowage_config::Config;
use stowage_core::path::{AbsPath, RelPath, validate_entry_name};
use tracing::{debug, info, warn};

/// Version recorded when the distribution carries no version file
pub const UNVERSIONED: &str = "unversioned";

/// Everything one run did
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Per-artifact results, in visiting order
    pub entries: Vec<EntryResult>,
    /// Components found in the distribution and synchronized
    pub components: Vec<String>,
    /// Requested components the distribution does not ship
    pub missing_components: Vec<String>,
    /// Version found in the distribution
    pub version: String,
    /// Version stamped into the install root during this run
    pub version_written: Option<String>,
    /// Whether artifacts were checked against a manifest
    pub manifest_checked: bool,
    /// Whether this was a dry run
    pub dry_run: bool,
    /// Mutations a dry run would have performed
    pub planned: Vec<Operation>,
}

impl RunSummary {
    /// Reports of every artifact that synchronized without error
    pub fn reports(&self) -> impl Iterator<Item = &SyncReport> {
        self.entries.iter().filter_map(|e| e.result.as_ref().ok())
    }

    /// Number of artifacts with `outcome`
    #[must_use]
    pub fn count(&self, outcome: SyncOutcome) -> usize {
        self.reports().filter(|r| r.outcome == outcome).count()
    }

    /// Entries whose error fails the run
    pub fn failures(&self) -> impl Iterator<Item = &EntryResult> {
        self.entries.iter().filter(|e| e.is_failure())
    }

    /// Entries rejected with a non-fatal error (unsafe names, links)
    pub fn rejected(&self) -> impl Iterator<Item = &EntryResult> {
        self.entries
            .iter()
            .filter(|e| e.result.as_ref().is_err_and(|err| err.kind().is_non_fatal()))
    }

    /// Structured documents installed verbatim because they did not parse
    #[must_use]
    pub fn parse_fallbacks(&self) -> usize {
        self.reports().filter(|r| r.parse_fallback).count()
    }

    /// Pristine backups written
    #[must_use]
    pub fn backups_written(&self) -> usize {
        self.reports().filter(|r| r.backup_written).count()
    }

    /// No artifact failed
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Synchronizes a distribution root onto an install root
#[derive(Debug, Clone)]
pub struct Installer<S: System> {
    source_root: AbsPath,
    dest_root: AbsPath,
    config: Config,
    system: S,
}

impl<S: System> Installer<S> {
    /// Installer from `source_root` onto `dest_root`, performing writes through `system`
    pub fn new(source_root: AbsPath, dest_root: AbsPath, config: Config, system: S) -> Self {
        Self {
            source_root,
            dest_root,
            config,
            system,
        }
    }

    /// Distribution root
    pub fn source_root(&self) -> &AbsPath {
        &self.source_root
    }

    /// Install root
    pub fn dest_root(&self) -> &AbsPath {
        &self.dest_root
    }

    /// Configuration in effect
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Filesystem the run writes through
    pub fn system(&self) -> &S {
        &self.system
    }

    /// The same installation, recording instead of writing
    #[must_use]
    pub fn plan(&self) -> Installer<DryRunSystem> {
        Installer::new(
            self.source_root.clone(),
            self.dest_root.clone(),
            self.config.clone(),
            DryRunSystem::new(),
        )
    }

    /// Components to synchronize
    ///
    /// Explicit names win, then the configured list, then every top-level
    /// entry of the distribution except the manifest, the version file and
    /// excluded directories.
    pub fn resolve_components(&self, requested: &[String]) -> Result<Vec<String>> {
        if !requested.is_empty() {
            return Ok(requested.to_vec());
        }
        if !self.config.install.components.is_empty() {
            return Ok(self.config.install.components.clone());
        }

        let general = &self.config.general;
        let excluded = |name: &str| {
            name == general.manifest_file
                || name == general.version_file
                || name == general.components_file
                || is_excluded_dir(name, &self.config.install.exclude_dirs)
        };

        let read_err = |source| Error::DirectoryRead {
            path: self.source_root.as_path().to_path_buf(),
            source,
        };
        let mut names = Vec::new();
        for entry in fs::read_dir(self.source_root.as_path()).map_err(read_err)? {
            let entry = entry.map_err(read_err)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !excluded(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Load the distribution's manifest according to policy
    ///
    /// # Errors
    ///
    /// `ManifestMissing` when none exists and one is required; read and parse
    /// errors otherwise.
    pub fn load_manifest(&self) -> Result<Option<Manifest>> {
        let path = self
            .source_root
            .as_path()
            .join(&self.config.general.manifest_file);

        match Manifest::load_optional(&path)? {
            Some(manifest) => {
                debug!(path = %path.display(), entries = manifest.len(), "Loaded integrity manifest");
                Ok(Some(manifest))
            }
            None if self.config.general.require_manifest => Err(Error::ManifestMissing { path }),
            None => {
                warn!(path = %path.display(), "No integrity manifest, artifacts are not verified");
                Ok(None)
            }
        }
    }

    /// Version shipped with the distribution
    ///
    /// The trimmed first line of the version file, or [`UNVERSIONED`].
    pub fn source_version(&self) -> String {
        let version = self
            .source_root
            .join_entry(&self.config.general.version_file)
            .ok()
            .and_then(|path| self.system.read_existing(&path).ok().flatten())
            .map(|bytes| {
                String::from_utf8_lossy(&bytes)
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string()
            })
            .unwrap_or_default();

        if version.is_empty() {
            UNVERSIONED.to_string()
        } else {
            version
        }
    }

    /// Synchronize `components` (or the default set when empty)
    ///
    /// Per-artifact failures are collected in the summary; only problems that
    /// prevent the run from starting (manifest policy, unreadable
    /// distribution root) are returned as errors.
    pub fn run(&self, components: &[String]) -> Result<RunSummary> {
        let manifest = self.load_manifest()?;
        let names = self.resolve_components(components)?;

        let sync_settings = SyncSettings::from_config(&self.config);
        let doc_settings = StructuredSettings::from_config(&self.config);
        let files = FileSync::new(&self.system, &sync_settings).with_manifest(manifest.as_ref());
        let structured = StructuredSync::new(&files, &doc_settings);

        let mut summary = RunSummary {
            version: self.source_version(),
            manifest_checked: manifest.is_some(),
            ..RunSummary::default()
        };

        info!(
            source = %self.source_root,
            dest = %self.dest_root,
            components = names.len(),
            "Synchronizing"
        );

        for name in names {
            self.sync_component(&name, &files, &structured, &mut summary);
        }

        if summary.is_success() {
            self.stamp_version(&mut summary);
            self.record_components(&mut summary, !components.is_empty());
        } else {
            warn!("Some artifacts failed, version marker left unchanged");
        }

        Ok(summary)
    }

    fn sync_component(
        &self,
        name: &str,
        files: &FileSync<'_, S>,
        structured: &StructuredSync<'_, S>,
        summary: &mut RunSummary,
    ) {
        if validate_entry_name(name).is_err() {
            warn!(component = name, "Rejecting unsafe component name");
            summary.entries.push(EntryResult::new(
                name,
                Err(Error::PathTraversalRejected {
                    name: name.to_string(),
                    parent: self.source_root.as_path().to_path_buf(),
                }),
            ));
            return;
        }

        let resolved = self.source_root.join_entry(name).and_then(|source| {
            let dest = self.dest_root.join_entry(name)?;
            let rel = RelPath::from_manifest_key(name)?;
            Ok((source, dest, rel))
        });
        let (source, dest, rel) = match resolved {
            Ok(paths) => paths,
            Err(err) => {
                summary.entries.push(EntryResult::new(name, Err(err.into())));
                return;
            }
        };

        match self.system.symlink_metadata(&source) {
            Ok(None) => {
                info!(component = name, "Component not shipped, nothing to do");
                summary.missing_components.push(name.to_string());
            }
            Ok(Some(metadata)) if metadata.file_type().is_symlink() => {
                warn!(component = name, "Component is a symbolic link, not following");
                summary.entries.push(EntryResult::new(
                    name,
                    Err(Error::SymlinkBlocked {
                        path: source.into_path_buf(),
                    }),
                ));
            }
            Ok(Some(metadata)) if metadata.is_dir() => {
                summary.components.push(name.to_string());
                let walk = TreeSync::new(source, dest, files)
                    .with_prefix(rel)
                    .with_structured(Some(structured))
                    .with_excludes(&self.config.install.exclude_dirs);
                summary.entries.extend(walk);
            }
            Ok(Some(_)) => {
                summary.components.push(name.to_string());
                let result = if structured.handles(&rel) {
                    structured.sync(&source, &dest, &rel)
                } else {
                    files.sync(&source, &dest, &rel)
                };
                summary.entries.push(EntryResult::new(name, result));
            }
            Err(err) => summary.entries.push(EntryResult::new(name, Err(err))),
        }
    }

    /// Record the distributed version in the install root, writing only on change
    fn stamp_version(&self, summary: &mut RunSummary) {
        let version_file = &self.config.general.version_file;
        let stamped = self.dest_root.join_entry(version_file).map_err(Error::from).and_then(|marker| {
            if self.system.is_symlink(&marker)? {
                return Err(Error::SymlinkBlocked {
                    path: marker.into_path_buf(),
                });
            }

            let content = format!("{}\n", summary.version);
            if self.system.read_existing(&marker)?.as_deref() == Some(content.as_bytes()) {
                return Ok(false);
            }
            self.system.create_dir_all(&self.dest_root)?;
            self.system.write_file(&marker, content.as_bytes(), None)?;
            Ok(true)
        });

        match stamped {
            Ok(true) => {
                info!(version = %summary.version, "Recorded installed version");
                summary.version_written = Some(summary.version.clone());
            }
            Ok(false) => {}
            Err(err) => {
                warn!(error = %err, "Could not record installed version");
                summary
                    .entries
                    .push(EntryResult::new(version_file.as_str(), Err(err)));
            }
        }
    }

    /// Record the synchronized components in the install root, writing only on change
    ///
    /// A run over the default component set replaces the record; a run over
    /// named components adds to it.
    fn record_components(&self, summary: &mut RunSummary, partial_run: bool) {
        let record_file = &self.config.general.components_file;
        let recorded = self
            .dest_root
            .join_entry(record_file)
            .map_err(Error::from)
            .and_then(|record| {
                if self.system.is_symlink(&record)? {
                    return Err(Error::SymlinkBlocked {
                        path: record.into_path_buf(),
                    });
                }

                let existing = self.system.read_existing(&record)?;
                let mut names: BTreeSet<String> = summary.components.iter().cloned().collect();
                if partial_run && let Some(existing) = &existing {
                    names.extend(parse_component_record(&String::from_utf8_lossy(existing)));
                }

                let content: String = names.iter().map(|name| format!("{name}\n")).collect();
                if existing.as_deref() == Some(content.as_bytes()) {
                    return Ok(());
                }
                self.system.create_dir_all(&self.dest_root)?;
                self.system.write_file(&record, content.as_bytes(), None)
            });

        if let Err(err) = recorded {
            warn!(error = %err, "Could not record installed components");
            summary
                .entries
                .push(EntryResult::new(record_file.as_str(), Err(err)));
        }
    }
}

/// Component names listed in a component record, one per line
pub fn parse_component_record(text: &str) -> impl Iterator<Item = String> + '_ {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
}

/// One synchronization request from an outer surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    /// Distribution root, resolved against the current directory
    pub source_root: PathBuf,
    /// Install root, resolved against the current directory
    pub dest_root: PathBuf,
    /// Components to synchronize; empty means the default set
    pub components: Vec<String>,
    /// Classify and report, never write
    pub dry_run: bool,
}

/// Run `request` against the real filesystem, or plan it when `dry_run` is set
///
/// # Errors
///
/// Roots that cannot be resolved, plus everything [`Installer::run`] returns.
pub fn synchronize(request: &SyncRequest, config: &Config) -> Result<RunSummary> {
    let source_root = AbsPath::resolve(&request.source_root)?;
    let dest_root = AbsPath::resolve(&request.dest_root)?;
    let installer = Installer::new(source_root, dest_root, config.clone(), RealSystem);

    if request.dry_run {
        let planner = installer.plan();
        let mut summary = planner.run(&request.components)?;
        summary.dry_run = true;
        summary.planned = planner.system().operations();
        Ok(summary)
    } else {
        installer.run(&request.components)
    }
}
