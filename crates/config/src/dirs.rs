//! XDG directory utilities
//!
//! This module provides XDG-compliant directory paths for stowage.
//! It follows the XDG Base Directory specification using the `xdg` crate:
//! - `XDG_CONFIG_HOME` defaults to ~/.config
//! - `XDG_STATE_HOME` defaults to ~/.local/state

use std::path::PathBuf;
use xdg::BaseDirectories;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "STOWAGE_CONFIG";

/// Get the stowage config directory
///
/// Returns `$XDG_CONFIG_HOME/stowage` or `~/.config/stowage`
#[must_use]
pub fn config_dir() -> Option<PathBuf> {
    BaseDirectories::with_prefix("stowage").get_config_home()
}

/// Get the stowage state directory (log files)
///
/// Returns `$XDG_STATE_HOME/stowage` or `~/.local/state/stowage`
#[must_use]
pub fn state_dir() -> Option<PathBuf> {
    BaseDirectories::with_prefix("stowage").get_state_home()
}

/// Get the default config file path
///
/// `$STOWAGE_CONFIG` wins when set, otherwise `config.toml` in [`config_dir`].
#[must_use]
pub fn default_config_file() -> Option<PathBuf> {
    if let Some(explicit) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(explicit));
    }
    config_dir().map(|d| d.join("config.toml"))
}
