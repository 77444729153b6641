//! Single-file synchronization
//!
//! Applies one classified [`Action`] to one destination. The first time a
//! destination is written a pristine backup is recorded beside it (the
//! previous content when there was any, otherwise the installed content);
//! backups are never rewritten. Updates for user-edited files are parked in a
//! pending sibling.

use crate::classify::{Action, classify};
use crate::digest::hash_content;
use crate::error::{Error, Result};
use crate::integrity::Manifest;
use crate::system::{System, file_mode};
use std::fmt;
use stowage_config::Config;
use stowage_core::path::{AbsPath, RelPath};
use tracing::{debug, info, warn};

/// Naming conventions for the files kept beside a destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Appended to a destination to name its pristine backup
    pub backup_suffix: String,
    /// Appended to a destination to name its pending update
    pub pending_suffix: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SyncSettings {
    /// Take suffixes from configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            backup_suffix: config.general.backup_suffix.clone(),
            pending_suffix: config.general.pending_suffix.clone(),
        }
    }

    /// Backup path of a destination
    #[must_use]
    pub fn backup_path(&self, dest: &AbsPath) -> AbsPath {
        dest.with_suffix(&self.backup_suffix)
    }

    /// Pending-update path of a destination
    #[must_use]
    pub fn pending_path(&self, dest: &AbsPath) -> AbsPath {
        dest.with_suffix(&self.pending_suffix)
    }
}

/// What happened to a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncOutcome {
    /// Written where nothing existed
    Installed,
    /// Already up to date, nothing written
    Unchanged,
    /// Overwritten (after a backup, when one was due)
    Updated,
    /// User-modified; new content parked in the pending sibling
    Skipped,
    /// A symbolic link sits where a file should be written; nothing written
    Blocked,
}

impl SyncOutcome {
    /// All outcomes, in reporting order
    pub const ALL: [SyncOutcome; 5] = [
        SyncOutcome::Installed,
        SyncOutcome::Updated,
        SyncOutcome::Unchanged,
        SyncOutcome::Skipped,
        SyncOutcome::Blocked,
    ];
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncOutcome::Installed => "installed",
            SyncOutcome::Unchanged => "unchanged",
            SyncOutcome::Updated => "updated",
            SyncOutcome::Skipped => "skipped",
            SyncOutcome::Blocked => "blocked",
        };
        f.write_str(label)
    }
}

/// Result of synchronizing one destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Destination path
    pub dest: AbsPath,
    /// Outcome
    pub outcome: SyncOutcome,
    /// Classification, `None` when blocked before classifying
    pub action: Option<Action>,
    /// A pristine backup was written during this run
    pub backup_written: bool,
    /// Pending update written during this run
    pub pending: Option<AbsPath>,
    /// Structured content could not be parsed and was copied verbatim
    pub parse_fallback: bool,
}

impl SyncReport {
    fn new(dest: &AbsPath, outcome: SyncOutcome, action: Option<Action>) -> Self {
        Self {
            dest: dest.clone(),
            outcome,
            action,
            backup_written: false,
            pending: None,
            parse_fallback: false,
        }
    }

    pub(crate) fn blocked(dest: &AbsPath) -> Self {
        Self::new(dest, SyncOutcome::Blocked, None)
    }
}

/// Synchronizes single files through a [`System`]
///
/// When a manifest is attached, every source artifact must match it before
/// anything is written.
pub struct FileSync<'a, S: System> {
    system: &'a S,
    settings: &'a SyncSettings,
    manifest: Option<&'a Manifest>,
}

impl<'a, S: System> FileSync<'a, S> {
    /// Create a synchronizer without an integrity gate
    pub fn new(system: &'a S, settings: &'a SyncSettings) -> Self {
        Self {
            system,
            settings,
            manifest: None,
        }
    }

    /// Gate every source artifact on `manifest`
    #[must_use]
    pub fn with_manifest(mut self, manifest: Option<&'a Manifest>) -> Self {
        self.manifest = manifest;
        self
    }

    /// The backing system
    pub fn system(&self) -> &'a S {
        self.system
    }

    /// Naming conventions in use
    pub fn settings(&self) -> &'a SyncSettings {
        self.settings
    }

    /// Synchronize `source` onto `dest`
    ///
    /// `artifact` is the source's path relative to the distribution root,
    /// used for the manifest lookup.
    ///
    /// # Errors
    ///
    /// `IntegrityMismatch`/`NotInManifest` when the source fails the gate (the
    /// destination is left untouched), `SymlinkBlocked` when the source is a
    /// link, filesystem errors for failed reads or writes.
    pub fn sync(&self, source: &AbsPath, dest: &AbsPath, artifact: &RelPath) -> Result<SyncReport> {
        if self.is_blocked(dest)? {
            warn!(dest = %dest, "Destination is a symbolic link, refusing to write");
            return Ok(SyncReport::blocked(dest));
        }

        let (content, mode) = self.read_source(source, artifact)?;
        self.apply(&content, mode, dest)
    }

    /// Read a source artifact and pass it through the integrity gate
    ///
    /// Returns the raw bytes and the source's permission bits.
    pub fn read_source(
        &self,
        source: &AbsPath,
        artifact: &RelPath,
    ) -> Result<(Vec<u8>, Option<u32>)> {
        let metadata = self
            .system
            .symlink_metadata(source)?
            .ok_or_else(|| Error::FileRead {
                path: source.as_path().to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })?;
        if metadata.file_type().is_symlink() {
            return Err(Error::SymlinkBlocked {
                path: source.as_path().to_path_buf(),
            });
        }

        let content = self.system.read_file(source)?;
        if let Some(manifest) = self.manifest {
            manifest.verify_artifact(artifact, &content)?;
        }

        Ok((content, file_mode(&metadata)))
    }

    /// Whether `dest` or one of its sibling files is a symbolic link
    pub fn is_blocked(&self, dest: &AbsPath) -> Result<bool> {
        Ok(self.system.is_symlink(dest)?
            || self.system.is_symlink(&self.settings.backup_path(dest))?
            || self.system.is_symlink(&self.settings.pending_path(dest))?)
    }

    /// Classify `dest` against `content` and apply the resulting action
    ///
    /// `content` is the exact byte sequence the destination should hold.
    pub fn apply(&self, content: &[u8], mode: Option<u32>, dest: &AbsPath) -> Result<SyncReport> {
        if self.is_blocked(dest)? {
            warn!(dest = %dest, "Destination is a symbolic link, refusing to write");
            return Ok(SyncReport::blocked(dest));
        }

        let backup_path = self.settings.backup_path(dest);
        let pending_path = self.settings.pending_path(dest);

        let current = self.read_destination(dest)?;
        let backup = self.system.read_existing(&backup_path)?;

        let source_digest = hash_content(content);
        let dest_digest = current.as_ref().map(|(bytes, _)| hash_content(bytes));
        let backup_digest = backup.as_deref().map(hash_content);

        let action = classify(
            &source_digest,
            dest_digest.as_ref(),
            backup_digest.as_ref(),
        );
        debug!(dest = %dest, %action, "Classified destination");

        let report = match action {
            Action::Install => {
                let mut report = SyncReport::new(dest, SyncOutcome::Installed, Some(action));
                if backup.is_none() {
                    self.write_guarded(&backup_path, content, mode)?;
                    report.backup_written = true;
                }
                self.write_guarded(dest, content, mode)?;
                info!(dest = %dest, "Installed");
                report
            }
            Action::Unchanged => SyncReport::new(dest, SyncOutcome::Unchanged, Some(action)),
            Action::Update => {
                self.write_guarded(dest, content, mode)?;
                info!(dest = %dest, "Updated");
                SyncReport::new(dest, SyncOutcome::Updated, Some(action))
            }
            Action::BackupAndUpdate => {
                // An empty destination holds nothing worth keeping; the new
                // content becomes the pristine reference instead
                let (pristine, pristine_mode) = match current.as_ref() {
                    Some((existing, existing_mode)) if !existing.is_empty() => {
                        (existing.as_slice(), *existing_mode)
                    }
                    _ => (content, mode),
                };
                // The backup must be on disk before the destination changes
                self.write_guarded(&backup_path, pristine, pristine_mode)?;
                info!(backup = %backup_path, "Saved pristine backup");
                self.write_guarded(dest, content, mode)?;
                info!(dest = %dest, "Updated");

                let mut report = SyncReport::new(dest, SyncOutcome::Updated, Some(action));
                report.backup_written = true;
                report
            }
            Action::Skip => {
                self.write_guarded(&pending_path, content, mode)?;
                warn!(
                    dest = %dest,
                    pending = %pending_path,
                    "Destination was modified locally, update written beside it"
                );
                let mut report = SyncReport::new(dest, SyncOutcome::Skipped, Some(action));
                report.pending = Some(pending_path);
                report
            }
        };

        Ok(report)
    }

    /// Current destination bytes and mode, `None` when absent
    fn read_destination(&self, dest: &AbsPath) -> Result<Option<(Vec<u8>, Option<u32>)>> {
        let Some(metadata) = self.system.symlink_metadata(dest)? else {
            return Ok(None);
        };
        if metadata.is_dir() {
            return Err(Error::FileWrite {
                path: dest.as_path().to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::IsADirectory,
                    "destination is a directory",
                ),
            });
        }

        let content = self.system.read_file(dest)?;
        Ok(Some((content, file_mode(&metadata))))
    }

    /// Write `path` unless a link has appeared there since classification
    fn write_guarded(&self, path: &AbsPath, content: &[u8], mode: Option<u32>) -> Result<()> {
        if self.system.is_symlink(path)? {
            return Err(Error::SymlinkBlocked {
                path: path.as_path().to_path_buf(),
            });
        }
        self.system.write_file(path, content, mode)
    }
}
