//! Directory tree synchronization
//!
//! [`TreeSync`] walks a source directory lazily and synchronizes each regular
//! file onto the mirrored destination path, yielding one [`EntryResult`] per
//! file or rejected entry. A failure on one entry never stops the walk.

use crate::error::{Error, Result};
use crate::integrity::is_excluded_dir;
use crate::structured::StructuredSync;
use crate::sync::{FileSync, SyncReport};
use crate::system::System;
use std::path::Path;
use stowage_core::path::{AbsPath, RelPath, validate_entry_name};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Result of one artifact
#[derive(Debug)]
pub struct EntryResult {
    /// Artifact path relative to the distribution root, `/`-separated
    pub artifact: String,
    /// What happened
    pub result: Result<SyncReport>,
}

impl EntryResult {
    /// Pair an artifact key with its outcome
    pub fn new(artifact: impl Into<String>, result: Result<SyncReport>) -> Self {
        Self {
            artifact: artifact.into(),
            result,
        }
    }

    /// Whether this entry failed with an error that should fail the run
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.result
            .as_ref()
            .is_err_and(|err| !err.kind().is_non_fatal())
    }
}

/// Lazy synchronization of one directory tree
///
/// Entries are visited in file-name order. Symbolic links in the source are
/// never followed; directories whose name is unsafe, or whose destination is a
/// link, are skipped with everything beneath them. Directories that manifests
/// leave out ([`is_excluded_dir`]) are skipped silently.
pub struct TreeSync<'a, S: System> {
    source_root: AbsPath,
    dest_root: AbsPath,
    prefix: Option<RelPath>,
    files: &'a FileSync<'a, S>,
    structured: Option<&'a StructuredSync<'a, S>>,
    excludes: Vec<String>,
    walker: Option<walkdir::IntoIter>,
}

impl<'a, S: System> TreeSync<'a, S> {
    /// Prepare a walk of `source_root`
    ///
    /// A missing source directory yields nothing.
    pub fn new(source_root: AbsPath, dest_root: AbsPath, files: &'a FileSync<'a, S>) -> Self {
        let walker = if source_root.as_path().is_dir() {
            Some(
                WalkDir::new(source_root.as_path())
                    .follow_links(false)
                    .sort_by_file_name()
                    .into_iter(),
            )
        } else {
            debug!(source = %source_root, "Source directory absent, nothing to synchronize");
            None
        };

        Self {
            source_root,
            dest_root,
            prefix: None,
            files,
            structured: None,
            excludes: Vec::new(),
            walker,
        }
    }

    /// Route structured documents through `structured`
    #[must_use]
    pub fn with_structured(mut self, structured: Option<&'a StructuredSync<'a, S>>) -> Self {
        self.structured = structured;
        self
    }

    /// Skip directories named in `excludes`, on top of the built-in deny-list
    #[must_use]
    pub fn with_excludes(mut self, excludes: &[String]) -> Self {
        self.excludes = excludes.to_vec();
        self
    }

    /// Artifact paths are reported (and checked against the manifest) under `prefix`
    #[must_use]
    pub fn with_prefix(mut self, prefix: RelPath) -> Self {
        self.prefix = Some(prefix);
        self
    }

    fn artifact(&self, rel: &RelPath) -> RelPath {
        match &self.prefix {
            Some(prefix) => prefix.join(rel),
            None => rel.clone(),
        }
    }

    fn display_key(&self, path: &Path) -> String {
        let rel = path.strip_prefix(self.source_root.as_path()).unwrap_or(path);
        let rel = rel.to_string_lossy().replace('\\', "/");
        match &self.prefix {
            Some(prefix) if rel.is_empty() => prefix.to_manifest_key(),
            Some(prefix) => format!("{}/{rel}", prefix.to_manifest_key()),
            None => rel,
        }
    }

    fn skip_subtree(&mut self) {
        if let Some(walker) = self.walker.as_mut() {
            walker.skip_current_dir();
        }
    }

    /// The destination root itself must be a real directory
    fn prepare_root(&mut self) -> Option<EntryResult> {
        let key = self.display_key(self.source_root.as_path());
        match self.files.system().is_symlink(&self.dest_root) {
            Ok(true) => {
                warn!(dest = %self.dest_root, "Destination directory is a symbolic link, skipping tree");
                self.walker = None;
                Some(EntryResult::new(
                    key,
                    Err(Error::SymlinkBlocked {
                        path: self.dest_root.as_path().to_path_buf(),
                    }),
                ))
            }
            Ok(false) => match self.files.system().create_dir_all(&self.dest_root) {
                Ok(()) => None,
                Err(err) => {
                    self.walker = None;
                    Some(EntryResult::new(key, Err(err)))
                }
            },
            Err(err) => {
                self.walker = None;
                Some(EntryResult::new(key, Err(err)))
            }
        }
    }

    fn visit(&mut self, entry: &walkdir::DirEntry) -> Option<EntryResult> {
        let key = self.display_key(entry.path());
        let file_type = entry.file_type();

        let name = entry.file_name().to_string_lossy();
        if let Err(err) = validate_entry_name(&name) {
            warn!(entry = %key, error = %err, "Rejecting unsafe entry name");
            if file_type.is_dir() {
                self.skip_subtree();
            }
            let parent = entry
                .path()
                .parent()
                .unwrap_or(self.source_root.as_path())
                .to_path_buf();
            return Some(EntryResult::new(
                key,
                Err(Error::PathTraversalRejected {
                    name: name.into_owned(),
                    parent,
                }),
            ));
        }

        if file_type.is_dir() && is_excluded_dir(&name, &self.excludes) {
            debug!(entry = %key, "Skipping non-distributable directory");
            self.skip_subtree();
            return None;
        }

        if file_type.is_symlink() {
            warn!(entry = %key, "Source entry is a symbolic link, not following");
            return Some(EntryResult::new(
                key,
                Err(Error::SymlinkBlocked {
                    path: entry.path().to_path_buf(),
                }),
            ));
        }

        let rel = match AbsPath::from_path(entry.path()).and_then(|p| p.strip_prefix(&self.source_root)) {
            Ok(rel) => rel,
            Err(err) => return Some(EntryResult::new(key, Err(err.into()))),
        };
        let dest = self.dest_root.join(&rel);

        if file_type.is_dir() {
            return self.enter_directory(key, &dest);
        }

        if !file_type.is_file() {
            debug!(entry = %key, "Skipping special file");
            return None;
        }

        let source = self.source_root.join(&rel);
        let artifact = self.artifact(&rel);
        let result = match self.structured {
            Some(structured) if structured.handles(&artifact) => {
                structured.sync(&source, &dest, &artifact)
            }
            _ => self.files.sync(&source, &dest, &artifact),
        };
        Some(EntryResult::new(key, result))
    }

    fn enter_directory(&mut self, key: String, dest: &AbsPath) -> Option<EntryResult> {
        let system = self.files.system();
        let outcome = match system.symlink_metadata(dest) {
            Ok(Some(metadata)) if metadata.file_type().is_symlink() => Err(Error::SymlinkBlocked {
                path: dest.as_path().to_path_buf(),
            }),
            Ok(_) => system.create_dir_all(dest),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => None,
            Err(err) => {
                warn!(entry = %key, error = %err, "Skipping directory");
                self.skip_subtree();
                Some(EntryResult::new(key, Err(err)))
            }
        }
    }
}

impl<S: System> Iterator for TreeSync<'_, S> {
    type Item = EntryResult;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let next = self.walker.as_mut()?.next()?;
            let entry = match next {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .unwrap_or(self.source_root.as_path())
                        .to_path_buf();
                    let key = self.display_key(&path);
                    let source = err
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                    return Some(EntryResult::new(
                        key,
                        Err(Error::DirectoryRead { path, source }),
                    ));
                }
            };

            let visited = if entry.depth() == 0 {
                self.prepare_root()
            } else {
                self.visit(&entry)
            };

            if visited.is_some() {
                return visited;
            }
        }
    }
}
