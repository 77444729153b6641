//! System abstraction for filesystem operations
//!
//! This module provides a trait-based abstraction over filesystem operations,
//! enabling testing and dry-run mode.

use crate::error::{Error, Result};
use std::fs::{self, Metadata};
use std::io::{ErrorKind, Write};
use stowage_core::path::AbsPath;

/// Mode applied to written files when the caller does not supply one
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Abstraction over filesystem operations
///
/// This trait allows us to implement different backends:
/// - `RealSystem`: Actual filesystem operations
/// - `DryRunSystem`: Reads the real filesystem, records mutations without executing them
pub trait System {
    /// Read a file's contents
    fn read_file(&self, path: &AbsPath) -> Result<Vec<u8>>;

    /// Replace a file's contents atomically, with optional Unix permissions
    ///
    /// The new content lands under a temporary name in the same directory and
    /// is renamed over `path`. A symbolic link at `path` is replaced, never
    /// followed.
    fn write_file(&self, path: &AbsPath, content: &[u8], mode: Option<u32>) -> Result<()>;

    /// Create a directory and all missing parents
    fn create_dir_all(&self, path: &AbsPath) -> Result<()>;

    /// Metadata without following links; `None` when nothing exists at `path`
    fn symlink_metadata(&self, path: &AbsPath) -> Result<Option<Metadata>>;

    /// Check if a path exists (following links)
    fn exists(&self, path: &AbsPath) -> bool;

    /// Whether `path` itself is a symbolic link
    fn is_symlink(&self, path: &AbsPath) -> Result<bool> {
        Ok(self
            .symlink_metadata(path)?
            .is_some_and(|m| m.file_type().is_symlink()))
    }

    /// Read a file if a regular file exists at `path`
    fn read_existing(&self, path: &AbsPath) -> Result<Option<Vec<u8>>> {
        match self.symlink_metadata(path)? {
            Some(metadata) if metadata.is_file() => self.read_file(path).map(Some),
            _ => Ok(None),
        }
    }
}

/// Real filesystem implementation
///
/// This implementation performs actual filesystem operations.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealSystem;

impl System for RealSystem {
    fn read_file(&self, path: &AbsPath) -> Result<Vec<u8>> {
        fs::read(path.as_path()).map_err(|e| Error::FileRead {
            path: path.as_path().to_path_buf(),
            source: e,
        })
    }

    fn write_file(&self, path: &AbsPath, content: &[u8], mode: Option<u32>) -> Result<()> {
        let write_err = |source| Error::FileWrite {
            path: path.as_path().to_path_buf(),
            source,
        };

        let parent = path.parent().ok_or_else(|| {
            write_err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "destination has no parent directory",
            ))
        })?;
        self.create_dir_all(&parent)?;

        let mut staged = tempfile::NamedTempFile::new_in(parent.as_path()).map_err(write_err)?;
        staged.write_all(content).map_err(write_err)?;
        staged.as_file().sync_all().map_err(write_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = fs::Permissions::from_mode(mode.unwrap_or(DEFAULT_FILE_MODE));
            staged
                .as_file()
                .set_permissions(permissions)
                .map_err(write_err)?;
        }
        #[cfg(not(unix))]
        let _ = mode;

        staged
            .persist(path.as_path())
            .map_err(|e| write_err(e.error))?;

        Ok(())
    }

    fn create_dir_all(&self, path: &AbsPath) -> Result<()> {
        fs::create_dir_all(path.as_path()).map_err(|e| Error::DirectoryCreate {
            path: path.as_path().to_path_buf(),
            source: e,
        })
    }

    fn symlink_metadata(&self, path: &AbsPath) -> Result<Option<Metadata>> {
        match fs::symlink_metadata(path.as_path()) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Metadata {
                path: path.as_path().to_path_buf(),
                source: e,
            }),
        }
    }

    fn exists(&self, path: &AbsPath) -> bool {
        path.as_path().exists()
    }
}

/// Dry-run system that records operations without executing them
///
/// Reads go to the real filesystem so classification sees the true state;
/// every mutation is recorded instead of performed.
#[derive(Debug, Default)]
pub struct DryRunSystem {
    operations: std::cell::RefCell<Vec<Operation>>,
}

/// An operation that would be performed on the filesystem
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Write a file
    WriteFile {
        /// Destination
        path: AbsPath,
        /// Bytes written
        size: usize,
        /// Unix permission bits applied, if any
        mode: Option<u32>,
    },
    /// Create a directory
    CreateDir {
        /// Directory created with its parents
        path: AbsPath,
    },
}

impl DryRunSystem {
    /// Create a new dry-run system
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the list of operations that would be performed
    pub fn operations(&self) -> Vec<Operation> {
        self.operations.borrow().clone()
    }

    /// Files that would be written
    pub fn written_paths(&self) -> Vec<AbsPath> {
        self.operations
            .borrow()
            .iter()
            .filter_map(|op| match op {
                Operation::WriteFile { path, .. } => Some(path.clone()),
                Operation::CreateDir { .. } => None,
            })
            .collect()
    }

    /// Record an operation
    fn record(&self, op: Operation) {
        self.operations.borrow_mut().push(op);
    }
}

impl System for DryRunSystem {
    fn read_file(&self, path: &AbsPath) -> Result<Vec<u8>> {
        RealSystem.read_file(path)
    }

    fn write_file(&self, path: &AbsPath, content: &[u8], mode: Option<u32>) -> Result<()> {
        self.record(Operation::WriteFile {
            path: path.clone(),
            size: content.len(),
            mode,
        });
        Ok(())
    }

    fn create_dir_all(&self, path: &AbsPath) -> Result<()> {
        if !RealSystem.exists(path) {
            self.record(Operation::CreateDir { path: path.clone() });
        }
        Ok(())
    }

    fn symlink_metadata(&self, path: &AbsPath) -> Result<Option<Metadata>> {
        RealSystem.symlink_metadata(path)
    }

    fn exists(&self, path: &AbsPath) -> bool {
        RealSystem.exists(path)
    }
}

/// Unix permission bits of a file, if the platform has them
#[must_use]
pub fn file_mode(metadata: &Metadata) -> Option<u32> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Some(metadata.permissions().mode() & 0o7777)
    }

    #[cfg(not(unix))]
    {
        let _ = metadata;
        None
    }
}
