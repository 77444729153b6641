//! Error types for the synchronization engine
//!
//! Every variant is scoped to a single artifact or a single document, so the
//! caller can record it and move on to unrelated artifacts.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for stowage-engine
#[derive(Error, Debug)]
pub enum Error {
    /// Artifact bytes do not hash to the digest the manifest records
    #[error("Integrity mismatch for {path}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        /// Manifest key of the artifact
        path: String,
        /// Digest recorded in the manifest
        expected: String,
        /// Digest of the bytes actually read
        actual: String,
    },

    /// Artifact is distributed but has no manifest entry
    #[error("Artifact {path} is not listed in the integrity manifest")]
    NotInManifest {
        /// Manifest key the artifact would have
        path: String,
    },

    /// A symbolic link was found where a regular file or directory was expected
    #[error("Refusing to follow symbolic link {}", path.display())]
    SymlinkBlocked {
        /// The link
        path: PathBuf,
    },

    /// A structured document could not be parsed
    #[error("Failed to parse structured document {}: {message}", path.display())]
    ParseFailure {
        /// Source document
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// A directory entry name would escape its parent
    #[error("Rejected unsafe entry '{name}' in {}", parent.display())]
    PathTraversalRejected {
        /// Rejected entry name
        name: String,
        /// Directory that contains it
        parent: PathBuf,
    },

    /// Error reading a file
    #[error("Failed to read file {}: {source}", path.display())]
    FileRead {
        /// Path involved
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Error writing a file
    #[error("Failed to write file {}: {source}", path.display())]
    FileWrite {
        /// Path involved
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Error creating a directory
    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryCreate {
        /// Path involved
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Error reading a directory
    #[error("Failed to read directory {}: {source}", path.display())]
    DirectoryRead {
        /// Path involved
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Error with file metadata
    #[error("Failed to read metadata for {}: {source}", path.display())]
    Metadata {
        /// Path involved
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The manifest document could not be read
    #[error("Failed to read manifest {}: {source}", path.display())]
    ManifestRead {
        /// Path involved
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The manifest document is malformed
    #[error("Invalid manifest {}: {message}", path.display())]
    ManifestParse {
        /// Manifest document
        path: PathBuf,
        /// What is wrong with it
        message: String,
    },

    /// A manifest is required but the distribution does not carry one
    #[error("Integrity manifest not found at {}", path.display())]
    ManifestMissing {
        /// Where the manifest was expected
        path: PathBuf,
    },

    /// A digest string is not 64 lowercase hex characters
    #[error("Invalid digest '{value}': expected 64 lowercase hex characters")]
    InvalidDigest {
        /// The offending text
        value: String,
    },

    /// Path construction error
    #[error(transparent)]
    Path(#[from] stowage_core::Error),
}

/// Flat classification of [`Error`] used in run summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Digest mismatch or missing manifest entry
    IntegrityMismatch,
    /// Symbolic link refused
    SymlinkBlocked,
    /// Structured document fell back to opaque bytes
    ParseFailure,
    /// Unsafe entry name skipped
    PathTraversalRejected,
    /// Permission denied, disk full and other OS failures
    Filesystem,
    /// Manifest document problems
    Manifest,
}

impl ErrorKind {
    /// Whether this kind is a reported skip rather than a failure of the artifact
    #[must_use]
    pub fn is_non_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::SymlinkBlocked | ErrorKind::ParseFailure | ErrorKind::PathTraversalRejected
        )
    }
}

impl Error {
    /// Classify this error for reporting
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::IntegrityMismatch { .. } | Error::NotInManifest { .. } => {
                ErrorKind::IntegrityMismatch
            }
            Error::SymlinkBlocked { .. } => ErrorKind::SymlinkBlocked,
            Error::ParseFailure { .. } => ErrorKind::ParseFailure,
            Error::PathTraversalRejected { .. } => ErrorKind::PathTraversalRejected,
            Error::FileRead { .. }
            | Error::FileWrite { .. }
            | Error::DirectoryCreate { .. }
            | Error::DirectoryRead { .. }
            | Error::Metadata { .. } => ErrorKind::Filesystem,
            Error::ManifestRead { .. }
            | Error::ManifestParse { .. }
            | Error::ManifestMissing { .. }
            | Error::InvalidDigest { .. } => ErrorKind::Manifest,
            Error::Path(stowage_core::Error::UnsafeEntryName { .. })
            | Error::Path(stowage_core::Error::PathEscapesBase { .. }) => {
                ErrorKind::PathTraversalRejected
            }
            Error::Path(_) => ErrorKind::Filesystem,
        }
    }

    /// Underlying OS error code, when the failure came from the operating system
    #[must_use]
    pub fn os_error_code(&self) -> Option<i32> {
        self.io_source().and_then(std::io::Error::raw_os_error)
    }

    /// Underlying I/O error, if any
    #[must_use]
    pub fn io_source(&self) -> Option<&std::io::Error> {
        match self {
            Error::FileRead { source, .. }
            | Error::FileWrite { source, .. }
            | Error::DirectoryCreate { source, .. }
            | Error::DirectoryRead { source, .. }
            | Error::Metadata { source, .. }
            | Error::ManifestRead { source, .. } => Some(source),
            Error::Path(stowage_core::Error::Io(source)) => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = Error::IntegrityMismatch {
            path: "a".to_string(),
            expected: "x".to_string(),
            actual: "y".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::IntegrityMismatch);
        assert!(!err.kind().is_non_fatal());

        let err = Error::SymlinkBlocked {
            path: PathBuf::from("/tmp/link"),
        };
        assert_eq!(err.kind(), ErrorKind::SymlinkBlocked);
        assert!(err.kind().is_non_fatal());

        let err = Error::Path(stowage_core::Error::UnsafeEntryName {
            name: "..".to_string(),
            reason: "directory reference",
        });
        assert_eq!(err.kind(), ErrorKind::PathTraversalRejected);
    }

    #[test]
    fn test_os_error_code_is_exposed() {
        let err = Error::FileWrite {
            path: PathBuf::from("/read-only/file"),
            source: std::io::Error::from_raw_os_error(13),
        };
        assert_eq!(err.kind(), ErrorKind::Filesystem);
        assert_eq!(err.os_error_code(), Some(13));
        assert!(err.to_string().contains("/read-only/file"));
    }

    #[test]
    fn test_non_io_errors_have_no_os_code() {
        let err = Error::NotInManifest {
            path: "hooks/x.sh".to_string(),
        };
        assert_eq!(err.os_error_code(), None);
    }

    #[test]
    fn test_unlisted_artifact_is_a_failure() {
        let err = Error::NotInManifest {
            path: "hooks/extra.sh".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::IntegrityMismatch);
        assert!(!err.kind().is_non_fatal());
    }
}
