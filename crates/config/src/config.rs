//! Configuration management
//!
//! This module handles loading, validating and saving stowage configuration.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// General configuration section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Suffix of the pristine copy kept next to an overwritten destination
    #[serde(default = "default_backup_suffix", rename = "backupSuffix")]
    pub backup_suffix: String,

    /// Suffix of the deferred update written beside a user-modified destination
    #[serde(default = "default_pending_suffix", rename = "pendingSuffix")]
    pub pending_suffix: String,

    /// Name of the integrity manifest at the distribution root
    #[serde(default = "default_manifest_file", rename = "manifestFile")]
    pub manifest_file: String,

    /// Name of the version marker, relative to both the distribution and install roots
    #[serde(default = "default_version_file", rename = "versionFile")]
    pub version_file: String,

    /// Name of the record of installed components, relative to the install root
    #[serde(default = "default_components_file", rename = "componentsFile")]
    pub components_file: String,

    /// Refuse to synchronize when the distribution carries no manifest
    #[serde(default, rename = "requireManifest")]
    pub require_manifest: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            backup_suffix: default_backup_suffix(),
            pending_suffix: default_pending_suffix(),
            manifest_file: default_manifest_file(),
            version_file: default_version_file(),
            components_file: default_components_file(),
            require_manifest: false,
        }
    }
}

/// Structured (machine-readable) configuration handling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredConfig {
    /// Keys starting with this prefix are authoring notes and never installed
    #[serde(default = "default_annotation_prefix", rename = "annotationPrefix")]
    pub annotation_prefix: String,

    /// File extensions (without dot, case-insensitive) treated as structured documents
    #[serde(default = "default_structured_extensions")]
    pub extensions: Vec<String>,

    /// Home directory substituted for placeholders (defaults to the invoking user's)
    #[serde(default)]
    pub home: Option<PathBuf>,
}

impl Default for StructuredConfig {
    fn default() -> Self {
        Self {
            annotation_prefix: default_annotation_prefix(),
            extensions: default_structured_extensions(),
            home: None,
        }
    }
}

/// Installation layout section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Components synchronized when none are named explicitly
    #[serde(default)]
    pub components: Vec<String>,

    /// Paths under the install root that must exist for a healthy installation
    #[serde(default, rename = "requiredComponents")]
    pub required_components: Vec<String>,

    /// Extra directory names excluded from manifest generation
    #[serde(default, rename = "excludeDirs")]
    pub exclude_dirs: Vec<String>,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Structured document settings
    #[serde(default)]
    pub structured: StructuredConfig,

    /// Installation layout
    #[serde(default)]
    pub install: InstallConfig,
}

fn default_backup_suffix() -> String {
    ".pristine-backup".to_string()
}

fn default_pending_suffix() -> String {
    ".new".to_string()
}

fn default_manifest_file() -> String {
    "integrity-manifest.json".to_string()
}

fn default_version_file() -> String {
    "VERSION".to_string()
}

fn default_components_file() -> String {
    ".installed-components".to_string()
}

fn default_annotation_prefix() -> String {
    "_comment".to_string()
}

fn default_structured_extensions() -> Vec<String> {
    vec!["json".to_string()]
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, TOML parsing fails or validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            stowage_core::Error::Message(format!(
                "Failed to read config file {}: {e}",
                path.as_ref().display()
            ))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            stowage_core::Error::Message(format!(
                "Failed to parse config file {}: {e}",
                path.as_ref().display()
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML string
    ///
    /// # Errors
    ///
    /// Returns error if TOML parsing or validation fails
    pub fn from_toml_str(toml_content: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_content).map_err(|e| {
            stowage_core::Error::Message(format!("Failed to parse config TOML: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, or the default location, or fall back to defaults
    ///
    /// An explicit path must exist. The default location is optional.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match crate::dirs::default_config_file() {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "Loading configuration");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Save configuration to a file
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file write fails
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            stowage_core::Error::Message(format!("Failed to serialize config: {e}"))
        })?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).map_err(|e| {
                stowage_core::Error::Message(format!(
                    "Failed to create config directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        fs::write(path.as_ref(), content).map_err(|e| {
            stowage_core::Error::Message(format!(
                "Failed to write config file {}: {e}",
                path.as_ref().display()
            ))
        })?;

        Ok(())
    }

    /// Check invariants the engine relies on
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        let general = &self.general;
        if general.backup_suffix.is_empty() || general.pending_suffix.is_empty() {
            return Err(stowage_core::Error::Message(
                "backupSuffix and pendingSuffix must not be empty".to_string(),
            ));
        }
        if general.backup_suffix == general.pending_suffix {
            return Err(stowage_core::Error::Message(format!(
                "backupSuffix and pendingSuffix must differ (both are '{}')",
                general.backup_suffix
            )));
        }
        if self.structured.annotation_prefix.is_empty() {
            return Err(stowage_core::Error::Message(
                "annotationPrefix must not be empty".to_string(),
            ));
        }

        stowage_core::validate_entry_name(&general.manifest_file)?;
        stowage_core::validate_entry_name(&general.version_file)?;
        stowage_core::validate_entry_name(&general.components_file)?;
        if general.components_file == general.version_file {
            return Err(stowage_core::Error::Message(format!(
                "componentsFile and versionFile must differ (both are '{}')",
                general.version_file
            )));
        }
        for component in &self.install.components {
            stowage_core::validate_entry_name(component)?;
        }
        for required in &self.install.required_components {
            stowage_core::RelPath::from_manifest_key(required)?;
        }

        Ok(())
    }

    /// Home directory used for placeholder substitution
    #[must_use]
    pub fn home_dir(&self) -> Option<PathBuf> {
        self.structured.home.clone().or_else(dirs::home_dir)
    }
}
