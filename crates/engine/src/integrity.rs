//! Integrity manifest generation and verification
//!
//! A manifest maps every distributable artifact (by `/`-separated path relative
//! to the distribution root) to the SHA-256 digest of its raw bytes. It is
//! generated at package-build time and checked artifact by artifact at install
//! time.

use crate::digest::{Digest, hash_content, hash_file};
use crate::error::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use stowage_core::path::{AbsPath, RelPath};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Directory names never included in a manifest
///
/// Version-control metadata, dependency and build caches, and the engine's
/// own runtime state.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
    ".cache",
    ".stowage",
];

/// Whether a directory named `name` is left out of manifests and installs
#[must_use]
pub fn is_excluded_dir(name: &str, extra_excludes: &[String]) -> bool {
    DEFAULT_EXCLUDED_DIRS.contains(&name) || extra_excludes.iter().any(|x| x == name)
}

/// Path → digest map for one distributed package version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    files: BTreeMap<String, Digest>,
}

/// Outcome of checking a whole tree against a manifest
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    /// Number of manifest entries checked
    pub checked: usize,
    /// Entries whose on-disk digest differs: (path, expected, actual)
    pub mismatched: Vec<(String, Digest, Digest)>,
    /// Entries listed in the manifest but absent or unreadable on disk
    pub missing: Vec<String>,
    /// Files on disk that the manifest does not list
    pub unlisted: Vec<String>,
}

impl VerificationReport {
    /// Check if verification passed
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.mismatched.is_empty() && self.missing.is_empty() && self.unlisted.is_empty()
    }
}

impl Manifest {
    /// Create an empty manifest
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manifest for every regular file under `root`
    ///
    /// Directories named in [`DEFAULT_EXCLUDED_DIRS`] or `extra_excludes` are
    /// skipped, as is a top-level file named `manifest_name`. Symbolic links
    /// are never followed nor listed. Unreadable files are left out rather
    /// than failing the build.
    pub fn build(root: &Path, manifest_name: &str, extra_excludes: &[String]) -> Self {
        let file_paths: Vec<PathBuf> = walk_distributable(root, manifest_name, extra_excludes)
            .map(DirEntry::into_path)
            .collect();

        let files: BTreeMap<String, Digest> = file_paths
            .par_iter()
            .filter_map(|path| {
                let key = manifest_key(root, path)?;
                match hash_file(path) {
                    Ok(digest) => Some((key, digest)),
                    Err(e) => {
                        debug!(path = %path.display(), error = %e, "Leaving unreadable file out of manifest");
                        None
                    }
                }
            })
            .collect();

        Self { files }
    }

    /// Load a manifest document
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::ManifestRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&content).map_err(|message| Error::ManifestParse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Load the manifest at `path` if one exists
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        match fs::symlink_metadata(path) {
            Ok(metadata) if metadata.file_type().is_symlink() => Err(Error::SymlinkBlocked {
                path: path.to_path_buf(),
            }),
            Ok(_) => Self::load(path).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::ManifestRead {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    fn from_json(content: &str) -> std::result::Result<Self, String> {
        let manifest: Self = serde_json::from_str(content).map_err(|e| e.to_string())?;
        for key in manifest.files.keys() {
            RelPath::from_manifest_key(key).map_err(|e| format!("entry '{key}': {e}"))?;
        }
        Ok(manifest)
    }

    /// Render the canonical document: sorted keys, two-space indent, trailing newline
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self).map_err(|e| Error::ManifestParse {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;
        json.push('\n');
        Ok(json)
    }

    /// Save the manifest document
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|e| Error::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Record an artifact's digest
    pub fn insert(&mut self, rel: &RelPath, digest: Digest) {
        self.files.insert(rel.to_manifest_key(), digest);
    }

    /// Expected digest of an artifact
    #[must_use]
    pub fn get(&self, rel: &RelPath) -> Option<&Digest> {
        self.files.get(&rel.to_manifest_key())
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the manifest has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Digest)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Check artifact bytes against the manifest
    ///
    /// # Errors
    ///
    /// `NotInManifest` when the artifact has no entry, `IntegrityMismatch`
    /// when its digest differs.
    pub fn verify_artifact(&self, rel: &RelPath, content: &[u8]) -> Result<Digest> {
        let key = rel.to_manifest_key();
        let expected = self
            .files
            .get(&key)
            .ok_or_else(|| Error::NotInManifest { path: key.clone() })?;

        let actual = hash_content(content);
        if actual == *expected {
            Ok(actual)
        } else {
            Err(Error::IntegrityMismatch {
                path: key,
                expected: expected.to_hex(),
                actual: actual.to_hex(),
            })
        }
    }

    /// Check every file under `root` against this manifest
    pub fn verify_tree(
        &self,
        root: &AbsPath,
        manifest_name: &str,
        extra_excludes: &[String],
    ) -> VerificationReport {
        let on_disk = Self::build(root.as_path(), manifest_name, extra_excludes);
        let mut report = VerificationReport {
            checked: self.files.len(),
            ..VerificationReport::default()
        };

        for (key, expected) in &self.files {
            match on_disk.files.get(key) {
                Some(actual) if actual == expected => {}
                Some(actual) => report.mismatched.push((key.clone(), *expected, *actual)),
                None => report.missing.push(key.clone()),
            }
        }
        report.unlisted = on_disk
            .files
            .keys()
            .filter(|key| !self.files.contains_key(*key))
            .cloned()
            .collect();

        report
    }
}

/// Check raw bytes against an expected digest
#[must_use]
pub fn verify(content: &[u8], expected: &Digest) -> bool {
    hash_content(content) == *expected
}

/// Regular files under `root` that belong in a manifest
fn walk_distributable<'a>(
    root: &'a Path,
    manifest_name: &'a str,
    extra_excludes: &'a [String],
) -> impl Iterator<Item = DirEntry> + 'a {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            !is_excluded_dir(&entry.file_name().to_string_lossy(), extra_excludes)
        })
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(move |entry| !(entry.depth() == 1 && entry.file_name() == manifest_name))
}

fn manifest_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    RelPath::new(rel.to_path_buf())
        .ok()
        .map(|rel| rel.to_manifest_key())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = "integrity-manifest.json";

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sample_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "settings.json", b"{}");
        write(root, "hooks/guard.sh", b"#!/bin/sh\n");
        write(root, "templates/a/b.md", b"# b\n");
        write(root, ".git/HEAD", b"ref: main");
        write(root, "node_modules/x/index.js", b"x");
        write(root, "hooks/.stowage/state", b"runtime");
        write(root, MANIFEST, b"{\"files\":{}}");
        temp
    }

    #[test]
    fn test_build_skips_excluded_and_self() {
        let temp = sample_tree();
        let manifest = Manifest::build(temp.path(), MANIFEST, &[]);

        let keys: Vec<&str> = manifest.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec!["hooks/guard.sh", "settings.json", "templates/a/b.md"]
        );
        let rel = RelPath::from_manifest_key("settings.json").unwrap();
        assert_eq!(manifest.get(&rel), Some(&hash_content(b"{}")));
    }

    #[test]
    fn test_build_extra_excludes() {
        let temp = sample_tree();
        let manifest = Manifest::build(temp.path(), MANIFEST, &["templates".to_string()]);
        assert_eq!(manifest.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_build_skips_unreadable_and_links() {
        use std::os::unix::fs::PermissionsExt;

        let temp = sample_tree();
        let secret = temp.path().join("secret.txt");
        fs::write(&secret, b"s").unwrap();
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();
        std::os::unix::fs::symlink(temp.path().join("settings.json"), temp.path().join("link.json"))
            .unwrap();

        let manifest = Manifest::build(temp.path(), MANIFEST, &[]);
        let link = RelPath::from_manifest_key("link.json").unwrap();
        assert!(manifest.get(&link).is_none());

        // Root can read anything, so only assert exclusion when the read really fails
        if fs::read(&secret).is_err() {
            let rel = RelPath::from_manifest_key("secret.txt").unwrap();
            assert!(manifest.get(&rel).is_none());
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp = sample_tree();
        let manifest = Manifest::build(temp.path(), MANIFEST, &[]);
        let path = temp.path().join(MANIFEST);
        manifest.save(&path).unwrap();

        let loaded = Manifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.ends_with('\n'));
        assert!(text.contains("\"hooks/guard.sh\""));
    }

    #[test]
    fn test_load_rejects_bad_digest_and_traversal() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(MANIFEST);

        fs::write(&path, r#"{"files":{"a.txt":"XYZ"}}"#).unwrap();
        assert!(matches!(
            Manifest::load(&path),
            Err(Error::ManifestParse { .. })
        ));

        let digest = hash_content(b"a");
        fs::write(&path, format!(r#"{{"files":{{"../a.txt":"{digest}"}}}}"#)).unwrap();
        assert!(matches!(
            Manifest::load(&path),
            Err(Error::ManifestParse { .. })
        ));
    }

    #[test]
    fn test_load_optional_absent() {
        let temp = TempDir::new().unwrap();
        assert!(
            Manifest::load_optional(&temp.path().join(MANIFEST))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_verify_artifact() {
        let mut manifest = Manifest::new();
        let rel = RelPath::from_manifest_key("hooks/guard.sh").unwrap();
        manifest.insert(&rel, hash_content(b"original"));

        assert!(manifest.verify_artifact(&rel, b"original").is_ok());
        assert!(matches!(
            manifest.verify_artifact(&rel, b"originaL"),
            Err(Error::IntegrityMismatch { .. })
        ));

        let other = RelPath::from_manifest_key("hooks/other.sh").unwrap();
        assert!(matches!(
            manifest.verify_artifact(&other, b"original"),
            Err(Error::NotInManifest { .. })
        ));
    }

    #[test]
    fn test_verify_tree_reports_drift() {
        let temp = sample_tree();
        let manifest = Manifest::build(temp.path(), MANIFEST, &[]);
        let root = AbsPath::from_path(temp.path()).unwrap();
        assert!(manifest.verify_tree(&root, MANIFEST, &[]).is_valid());

        write(temp.path(), "settings.json", b"{\"tampered\":true}");
        fs::remove_file(temp.path().join("templates/a/b.md")).unwrap();
        write(temp.path(), "extra.txt", b"new");

        let report = manifest.verify_tree(&root, MANIFEST, &[]);
        assert!(!report.is_valid());
        assert_eq!(report.checked, 3);
        assert_eq!(report.mismatched.len(), 1);
        assert_eq!(report.mismatched[0].0, "settings.json");
        assert_eq!(report.missing, vec!["templates/a/b.md".to_string()]);
        assert_eq!(report.unlisted, vec!["extra.txt".to_string()]);
    }
}
