//! Type-safe path types
//!
//! This module provides two distinct path types using the newtype pattern:
//!
//! - [`AbsPath`]: Absolute filesystem paths (installation and distribution roots)
//! - [`RelPath`]: Relative paths that never escape their base (artifact identities)
//!
//! These types prevent common path manipulation errors at compile time.
//!
//! # Examples
//!
//! ```
//! use stowage_core::path::{AbsPath, RelPath};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let root = AbsPath::new("/opt/toolkit".into())?;
//! let settings = RelPath::new("config/settings.json".into())?;
//!
//! let installed = root.join(&settings);
//! assert_eq!(installed.as_path().to_str().unwrap(), "/opt/toolkit/config/settings.json");
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// An absolute path on the filesystem
///
/// This type guarantees that the path is absolute (starts with `/` on Unix or a drive letter on Windows).
/// Use this for file operations and as base directories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbsPath(PathBuf);

impl AbsPath {
    /// Create a new `AbsPath` from a `PathBuf`
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute.
    ///
    /// # Examples
    ///
    /// ```
    /// use stowage_core::path::AbsPath;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let abs = AbsPath::new("/home/user".into())?;
    /// assert!(abs.as_path().is_absolute());
    ///
    /// let err = AbsPath::new("relative/path".into());
    /// assert!(err.is_err());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(path: PathBuf) -> Result<Self> {
        if path.is_absolute() {
            Ok(AbsPath(path))
        } else {
            Err(Error::PathNotAbsolute { path })
        }
    }

    /// Create a new `AbsPath` from a reference to a `Path`
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute.
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::new(path.to_path_buf())
    }

    /// Resolve a possibly relative path against the current working directory
    ///
    /// The path does not need to exist.
    pub fn resolve(path: &Path) -> Result<Self> {
        if path.is_absolute() {
            return Self::from_path(path);
        }
        let cwd = std::env::current_dir()?;
        Self::new(cwd.join(path))
    }

    /// Get the underlying `Path`
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Convert to a `PathBuf`
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// Join with a relative path to create a new absolute path
    pub fn join(&self, rel: &RelPath) -> Self {
        AbsPath(self.0.join(rel.as_path()))
    }

    /// Join a single, already validated entry name
    ///
    /// # Errors
    ///
    /// Returns an error if `name` fails [`validate_entry_name`].
    pub fn join_entry(&self, name: &str) -> Result<Self> {
        validate_entry_name(name)?;
        Ok(AbsPath(self.0.join(name)))
    }

    /// Get the parent directory
    ///
    /// Returns `None` if this is the root directory.
    pub fn parent(&self) -> Option<Self> {
        self.0.parent().map(|p| AbsPath(p.to_path_buf()))
    }

    /// Append a literal suffix to the final component (`a/b.json` + `.new` = `a/b.json.new`)
    pub fn with_suffix(&self, suffix: &str) -> Self {
        let mut raw = self.0.clone().into_os_string();
        raw.push(suffix);
        AbsPath(PathBuf::from(raw))
    }

    /// Strip a base directory prefix to get a relative path
    ///
    /// # Errors
    ///
    /// Returns an error if `self` is not under `base`.
    ///
    /// # Examples
    ///
    /// ```
    /// use stowage_core::path::AbsPath;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let root = AbsPath::new("/opt/toolkit".into())?;
    /// let file = AbsPath::new("/opt/toolkit/hooks/guard.sh".into())?;
    /// let rel = file.strip_prefix(&root)?;
    /// assert_eq!(rel.to_manifest_key(), "hooks/guard.sh");
    /// # Ok(())
    /// # }
    /// ```
    pub fn strip_prefix(&self, base: &AbsPath) -> Result<RelPath> {
        self.0
            .strip_prefix(&base.0)
            .map(|p| RelPath(p.to_path_buf()))
            .map_err(|_| Error::InvalidPathPrefix {
                path: std::sync::Arc::new(self.as_path().to_path_buf()),
                base: std::sync::Arc::new(base.as_path().to_path_buf()),
            })
    }

    /// Get the file name
    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name().and_then(|s| s.to_str())
    }
}

/// A relative path that stays inside its base directory
///
/// Construction rejects absolute paths and any `..`, root or prefix component,
/// so joining a `RelPath` onto an [`AbsPath`] can never leave that root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelPath(PathBuf);

impl RelPath {
    /// Create a new `RelPath` from a `PathBuf`
    ///
    /// # Errors
    ///
    /// Returns an error if the path is absolute or contains a parent reference.
    pub fn new(path: PathBuf) -> Result<Self> {
        if !path.is_relative() {
            return Err(Error::PathNotRelative { path });
        }
        let escapes = path.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(Error::PathEscapesBase { path });
        }
        Ok(RelPath(path))
    }

    /// Parse a manifest key (always `/`-separated) into a native relative path
    pub fn from_manifest_key(key: &str) -> Result<Self> {
        Self::new(key.split('/').filter(|s| !s.is_empty()).collect())
    }

    /// Render as a `/`-separated key, independent of the host separator
    pub fn to_manifest_key(&self) -> String {
        self.0
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Get the underlying `Path`
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Convert to a `PathBuf`
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// Join with another relative path
    pub fn join(&self, other: &RelPath) -> Self {
        RelPath(self.0.join(&other.0))
    }

    /// Get the file name
    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name().and_then(|s| s.to_str())
    }

    /// Lowercased extension of the final component, if any
    pub fn extension(&self) -> Option<String> {
        self.0
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// Check that a single directory entry name is safe to join onto a directory
///
/// Rejects empty names, `.` and `..`, names containing a `/` or `\` separator,
/// and names containing a NUL byte.
///
/// # Examples
///
/// ```
/// use stowage_core::validate_entry_name;
///
/// assert!(validate_entry_name("settings.json").is_ok());
/// assert!(validate_entry_name("..").is_err());
/// assert!(validate_entry_name("../etc").is_err());
/// ```
pub fn validate_entry_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("empty name")
    } else if name == "." || name == ".." {
        Some("directory reference")
    } else if name.contains('/') || name.contains('\\') {
        Some("contains a path separator")
    } else if name.contains('\0') {
        Some("contains a NUL byte")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::UnsafeEntryName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

impl std::fmt::Display for AbsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl std::fmt::Display for RelPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_rel_path_rejects_parent_components() {
        assert!(RelPath::new("a/../b".into()).is_err());
        assert!(RelPath::new("../b".into()).is_err());
        assert!(RelPath::new("/abs".into()).is_err());
        assert!(RelPath::new("a/./b".into()).is_ok());
    }

    #[test]
    fn test_manifest_key_round_trip() {
        let rel = RelPath::from_manifest_key("hooks/pre/guard.sh").unwrap();
        assert_eq!(rel.to_manifest_key(), "hooks/pre/guard.sh");
        assert_eq!(rel.file_name(), Some("guard.sh"));
        assert!(RelPath::from_manifest_key("hooks/../../etc/passwd").is_err());
    }

    #[test]
    fn test_with_suffix_appends_to_file_name() {
        let path = AbsPath::new("/opt/kit/settings.json".into()).unwrap();
        assert_eq!(
            path.with_suffix(".new").as_path(),
            Path::new("/opt/kit/settings.json.new")
        );
    }

    #[test]
    fn test_join_entry_validates() {
        let root = AbsPath::new("/opt/kit".into()).unwrap();
        assert!(root.join_entry("hooks").is_ok());
        assert!(root.join_entry("..").is_err());
        assert!(root.join_entry("a/b").is_err());
    }

    #[test]
    fn test_validate_entry_name_cases() {
        let cases = [
            ("settings.json", true),
            ("..hidden", true),
            ("config..bak", true),
            ("", false),
            (".", false),
            ("..", false),
            ("a/b", false),
            ("a\\b", false),
            ("nul\0byte", false),
        ];
        for (name, ok) in cases {
            assert_eq!(validate_entry_name(name).is_ok(), ok, "name: {name:?}");
        }
    }

    #[test]
    fn test_extension_is_lowercased() {
        let rel = RelPath::new("Settings.JSON".into()).unwrap();
        assert_eq!(rel.extension().as_deref(), Some("json"));
    }

    #[test]
    fn test_resolve_relative_against_cwd() {
        let resolved = AbsPath::resolve(Path::new("some/dir")).unwrap();
        assert!(resolved.as_path().is_absolute());
        assert!(resolved.as_path().ends_with("some/dir"));
    }
}
