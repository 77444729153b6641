//! Error types for CLI commands

use stowage_engine::HealthState;
use thiserror::Error;

/// Errors that can occur during command execution
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CommandError {
    /// Synchronization finished but some artifacts failed
    #[error("Sync failed: {failed} out of {total} entries")]
    SyncFailed {
        /// Number of entries that failed
        failed: usize,
        /// Total number of entries
        total: usize,
    },

    /// A tree does not match its manifest
    #[error("Verification failed: {issues} issue(s) against the manifest")]
    VerificationFailed {
        /// Mismatched, missing and unlisted files together
        issues: usize,
    },

    /// Diagnosis found an unhealthy installation
    #[error("Installation is {state}")]
    Unhealthy {
        /// Diagnosed state
        state: HealthState,
    },

    /// Engine error
    #[error(transparent)]
    Engine(#[from] stowage_engine::Error),

    /// Path or configuration error
    #[error(transparent)]
    Core(#[from] stowage_core::Error),

    /// Interactive prompt error
    #[error("Prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for command operations
pub type Result<T> = std::result::Result<T, CommandError>;
