//! # Stowage Engine
//!
//! Installs a distributed tree of configuration artifacts into a user's
//! install root without ever discarding the user's own edits.
//!
//! - **Integrity**: SHA-256 manifests generated at build time and checked per artifact
//! - **Classification**: a pure five-way decision from source, destination and backup digests
//! - **Synchronization**: single files, structured documents and whole trees
//! - **Installer**: component selection, manifest policy and version stamping
//! - **Diagnostics**: read-only health checks with a confirmation-gated repair
//! - **System Abstraction**: filesystem operations abstracted for dry runs and tests

pub mod classify;
pub mod diagnostics;
pub mod digest;
pub mod error;
pub mod installer;
pub mod integrity;
pub mod structured;
pub mod sync;
pub mod system;
pub mod tree;

// Re-export path types from core
pub use stowage_core::path::{AbsPath, RelPath};

pub use error::{Error, ErrorKind, Result};

// Re-export commonly used types
pub use classify::{Action, classify};
pub use diagnostics::{
    Diagnosis, Doctor, HealthState, Issue, IssueKind, RepairOptions, RepairReport, RepairStrategy,
};
pub use digest::{Digest, hash_content, hash_file};
pub use installer::{Installer, RunSummary, SyncRequest, synchronize};
pub use integrity::{Manifest, VerificationReport, is_excluded_dir, verify};
pub use structured::{StructuredSettings, StructuredSync};
pub use sync::{FileSync, SyncOutcome, SyncReport, SyncSettings};
pub use system::{DryRunSystem, Operation, RealSystem, System};
pub use tree::{EntryResult, TreeSync};
