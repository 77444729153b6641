//! Base error types for stowage
//!
//! This module provides the foundation error types that all crates can use.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Base error type for shared functionality
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path is not absolute
    #[error("Path must be absolute: {path}")]
    PathNotAbsolute {
        /// The offending path
        path: PathBuf,
    },

    /// Path is not relative
    #[error("Path must be relative: {path}")]
    PathNotRelative {
        /// The offending path
        path: PathBuf,
    },

    /// Relative path escapes its base through `..` or a root component
    #[error("Path escapes its base directory: {path}")]
    PathEscapesBase {
        /// The offending path
        path: PathBuf,
    },

    /// Invalid path prefix
    #[error("Path {} is not under base directory {}", path.display(), base.display())]
    InvalidPathPrefix {
        /// Path that was expected under `base`
        path: Arc<PathBuf>,
        /// Base directory
        base: Arc<PathBuf>,
    },

    /// A single entry name is not safe to join onto a directory
    #[error("Unsafe entry name '{name}': {reason}")]
    UnsafeEntryName {
        /// The rejected name
        name: String,
        /// Which rule it broke
        reason: &'static str,
    },

    /// Generic error message
    #[error("{0}")]
    Message(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
