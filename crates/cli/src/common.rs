//! Common utilities and types shared across CLI commands

use crate::error::Result;
use std::path::Path;
use std::sync::Arc;
use stowage_config::Config;
use stowage_core::path::AbsPath;

/// Runtime context for CLI commands
///
/// Holds what every command needs, so commands take one context instead of a
/// growing parameter list.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    /// Shared configuration (uses Arc to avoid cloning)
    pub config: Arc<Config>,
    /// Print every artifact, including unchanged ones
    pub verbose: bool,
}

impl RuntimeContext {
    /// Create a new runtime context
    pub fn new(config: Config, verbose: bool) -> Self {
        Self {
            config: Arc::new(config),
            verbose,
        }
    }
}

/// Resolve a user-supplied root against the current directory
///
/// The path does not need to exist yet.
pub fn resolve_root(path: &Path) -> Result<AbsPath> {
    Ok(AbsPath::resolve(&expand_tilde(path))?)
}

/// Expand a leading `~` to the home directory
fn expand_tilde(path: &Path) -> std::path::PathBuf {
    // Early return for common case (no tilde) - avoids string conversion
    if !path.as_os_str().as_encoded_bytes().starts_with(b"~") {
        return path.to_path_buf();
    }

    let Some(home) = dirs::home_dir() else {
        return path.to_path_buf();
    };

    match path.to_str() {
        Some("~") => home,
        Some(s) if s.starts_with("~/") => home.join(&s[2..]),
        _ => path.to_path_buf(),
    }
}
